use anyhow::{anyhow, Context};
use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenv::dotenv;
use secrecy::{ExposeSecret, Secret};
use std::env;
use tracing::info;

pub mod actions;
mod models;
mod schema;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type DbConnection = PgConnection;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn database_url_from_env() -> anyhow::Result<Secret<String>> {
    dotenv().ok();
    env::var("DATABASE_URL")
        .map(Secret::new)
        .context("DATABASE_URL must be set")
}

pub fn create_pool(database_url: &Secret<String>) -> anyhow::Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url.expose_secret());
    r2d2::Pool::builder()
        .build(manager)
        .context("Failed to create db pool")
}

#[tracing::instrument(name = "Run migrations", skip(conn))]
pub fn run_migrations(conn: &mut DbConnection) -> anyhow::Result<()> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("Failed to run migrations: {e}"))?;
    info!(applied = applied.len(), "Database schema is up to date");
    Ok(())
}
