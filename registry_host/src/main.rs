use anyhow::Context;
use tracing_subscriber::EnvFilter;

use registry_host::{
    application::{reset_store, Application},
    db::{create_pool, run_migrations},
    settings::Settings,
    spawn_blocking_with_tracing,
};

fn setup() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug")
    }
    tracing_subscriber::fmt::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup();
    let settings = Settings::from_env()?;
    let pool = create_pool(&settings.database.url)?;

    let migration_pool = pool.clone();
    spawn_blocking_with_tracing(move || {
        let mut conn = migration_pool.get().context("Could not get DbConnection")?;
        run_migrations(&mut conn)
    })
    .await
    .context("Failed to spawn blocking task.")??;

    if settings.peer.clear {
        return reset_store(pool).await;
    }

    Application::build(&settings.peer, pool)?
        .run_until_stopped()
        .await?;
    Ok(())
}
