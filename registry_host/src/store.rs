use anyhow::Context;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::pg::PgConnection;
use peer_registry::{
    store::{decode_counter, decode_registry, encode_registry, COUNTER_KEY, REGISTRY_KEY},
    ChangeFeed, PeerId, PeerRecord, Registry, Store,
};
use tracing::debug;
use uuid::Uuid;

use crate::db::{actions, DbPool};

type PooledPg = PooledConnection<ConnectionManager<PgConnection>>;

/// Registry store shared by every peer on the host through one database.
///
/// Each registry write bumps the row's revision and records the writer, which
/// is what feeds compare against when they are polled.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    writer: Uuid,
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("writer", &self.writer)
            .finish()
    }
}

impl PgStore {
    pub fn connect(pool: DbPool) -> Self {
        Self {
            pool,
            writer: Uuid::new_v4(),
        }
    }

    pub fn writer(&self) -> Uuid {
        self.writer
    }

    fn conn(&self) -> anyhow::Result<PooledPg> {
        self.pool.get().context("Could not get DbConnection")
    }
}

impl Store for PgStore {
    fn load(&self) -> anyhow::Result<Registry> {
        let entry = actions::find_entry(REGISTRY_KEY, &mut *self.conn()?)?;
        Ok(decode_registry(entry.as_ref().map(|e| e.value.as_str())))
    }

    #[tracing::instrument(name = "Save registry", skip(self, registry), fields(writer = %self.writer))]
    fn save(&self, registry: &[PeerRecord]) -> anyhow::Result<()> {
        let raw = encode_registry(registry)?;
        let revision =
            actions::write_value(REGISTRY_KEY, &raw, Some(self.writer), &mut *self.conn()?)?;
        debug!(revision, peers = registry.len(), "Stored registry");
        Ok(())
    }

    #[tracing::instrument(name = "Allocate id", skip(self))]
    fn allocate_id(&self) -> anyhow::Result<PeerId> {
        let mut conn = self.conn()?;
        loop {
            let current = actions::find_entry(COUNTER_KEY, &mut conn)?;
            let current = current.as_ref().map(|e| e.value.as_str());
            let id = decode_counter(current) + 1;
            if actions::compare_and_swap(COUNTER_KEY, current, &id.to_string(), &mut conn)? {
                return Ok(id);
            }
            debug!("Counter moved underneath us, retrying");
        }
    }

    fn reset(&self) -> anyhow::Result<()> {
        let deleted = actions::delete_entries(&[REGISTRY_KEY, COUNTER_KEY], &mut *self.conn()?)?;
        debug!(deleted, "Cleared registry store");
        Ok(())
    }

    fn subscribe(&self) -> anyhow::Result<Box<dyn ChangeFeed>> {
        let seen = actions::find_entry(REGISTRY_KEY, &mut *self.conn()?)?
            .map(|e| e.revision)
            .unwrap_or_default();
        Ok(Box::new(PgFeed {
            pool: self.pool.clone(),
            writer: self.writer,
            seen,
        }))
    }
}

/// Reports the latest registry whenever its revision moved since the last
/// poll. Writes landing between two polls collapse into the newest one.
struct PgFeed {
    pool: DbPool,
    writer: Uuid,
    seen: i64,
}

impl ChangeFeed for PgFeed {
    fn try_next(&mut self) -> anyhow::Result<Option<Registry>> {
        let mut conn = self.pool.get().context("Could not get DbConnection")?;
        let Some(entry) = actions::find_entry(REGISTRY_KEY, &mut conn)? else {
            return Ok(None);
        };
        if entry.revision == self.seen {
            return Ok(None);
        }
        self.seen = entry.revision;
        if entry.writer == Some(self.writer) {
            return Ok(None);
        }
        Ok(Some(decode_registry(Some(&entry.value))))
    }
}
