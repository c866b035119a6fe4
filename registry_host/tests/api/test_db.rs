use diesel::{sql_query, Connection, PgConnection, RunQueryDsl};
use registry_host::db::{database_url_from_env, run_migrations};
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};
use url::Url;

static TEST_DB_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A throwaway database next to the one `DATABASE_URL` points at, migrated on
/// creation and dropped with the value.
#[derive(Debug)]
pub struct TestDb {
    admin_url: String,
    url: String,
    name: String,
    delete_on_drop: bool,
}

impl TestDb {
    pub fn new() -> Self {
        let admin_url = database_url_from_env()
            .expect("Tests need DATABASE_URL")
            .expose_secret()
            .clone();
        let name = format!(
            "registry_test_{}_{}",
            std::process::id(),
            TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst)
        );
        let mut admin = PgConnection::establish(&admin_url).unwrap();
        sql_query(format!("CREATE DATABASE {name};"))
            .execute(&mut admin)
            .unwrap();

        let mut url = Url::parse(&admin_url).unwrap();
        url.set_path(&name);
        let db = Self {
            admin_url,
            url: url.to_string(),
            name,
            delete_on_drop: true,
        };
        run_migrations(&mut db.conn()).unwrap();
        db
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn conn(&self) -> PgConnection {
        PgConnection::establish(&self.url).unwrap()
    }

    /// Keeps the database around for inspection after the test.
    #[allow(dead_code)]
    pub fn leak(&mut self) {
        self.delete_on_drop = false;
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        if !self.delete_on_drop {
            warn!("TestDb leaking database {}", self.name);
            return;
        }
        debug!("Dropping DB {}", self.name);
        let mut admin = PgConnection::establish(&self.admin_url).unwrap();
        sql_query(format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{}'",
            self.name
        ))
        .execute(&mut admin)
        .unwrap();
        sql_query(format!("DROP DATABASE {}", self.name))
            .execute(&mut admin)
            .unwrap();
    }
}
