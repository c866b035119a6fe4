use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    decode_counter, decode_registry, encode_registry, ChangeFeed, Store, COUNTER_KEY, REGISTRY_KEY,
};
use crate::record::{PeerId, PeerRecord, Registry};

/// How many unread registry replacements a feed may fall behind by.
const CHANGE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Change {
    writer: Uuid,
    registry: Registry,
}

/// Key/value medium shared by every peer living in this process.
///
/// Values are kept serialized, so peers exchange exactly what a persistent
/// backend would hold.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    values: Arc<Mutex<HashMap<String, String>>>,
    changes: broadcast::Sender<Change>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            values: Default::default(),
            changes,
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle with a fresh writer identity.
    pub fn connect(&self) -> MemoryStore {
        MemoryStore {
            backend: self.clone(),
            writer: Uuid::new_v4(),
        }
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    /// Writes a value without notifying anyone.
    pub fn set_raw<S: Into<String>>(&self, key: &str, value: S) {
        self.values.lock().insert(key.to_string(), value.into());
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    backend: MemoryBackend,
    writer: Uuid,
}

impl MemoryStore {
    pub fn writer(&self) -> Uuid {
        self.writer
    }

    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }
}

impl Store for MemoryStore {
    fn load(&self) -> anyhow::Result<Registry> {
        Ok(decode_registry(self.backend.raw(REGISTRY_KEY).as_deref()))
    }

    #[tracing::instrument(name = "Save registry", skip(self, registry), fields(writer = %self.writer))]
    fn save(&self, registry: &[PeerRecord]) -> anyhow::Result<()> {
        let raw = encode_registry(registry)?;
        let change = Change {
            writer: self.writer,
            registry: registry.to_vec(),
        };
        // Store and announce under one lock so feeds see writes in stored order.
        let mut values = self.backend.values.lock();
        values.insert(REGISTRY_KEY.to_string(), raw);
        // Nobody listening is fine.
        if let Ok(receivers) = self.backend.changes.send(change) {
            debug!(receivers, peers = registry.len(), "Announced registry");
        }
        drop(values);
        Ok(())
    }

    fn allocate_id(&self) -> anyhow::Result<PeerId> {
        let mut values = self.backend.values.lock();
        let id = decode_counter(values.get(COUNTER_KEY).map(String::as_str)) + 1;
        values.insert(COUNTER_KEY.to_string(), id.to_string());
        Ok(id)
    }

    fn reset(&self) -> anyhow::Result<()> {
        let mut values = self.backend.values.lock();
        values.remove(REGISTRY_KEY);
        values.remove(COUNTER_KEY);
        Ok(())
    }

    fn subscribe(&self) -> anyhow::Result<Box<dyn ChangeFeed>> {
        Ok(Box::new(MemoryFeed {
            changes: self.backend.changes.subscribe(),
            writer: self.writer,
        }))
    }
}

struct MemoryFeed {
    changes: broadcast::Receiver<Change>,
    writer: Uuid,
}

impl ChangeFeed for MemoryFeed {
    fn try_next(&mut self) -> anyhow::Result<Option<Registry>> {
        loop {
            match self.changes.try_recv() {
                Ok(change) if change.writer == self.writer => continue,
                Ok(change) => return Ok(Some(change.registry)),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Change feed fell behind, skipping to newer registries");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(None),
            }
        }
    }
}
