use anyhow::Context;
use tracing::warn;

use crate::record::{PeerId, PeerRecord, Registry};

pub mod memory;

/// Key holding the serialized registry.
pub const REGISTRY_KEY: &str = "windows";

/// Key holding the id counter.
pub const COUNTER_KEY: &str = "count";

/// One peer's handle onto the shared key/value medium.
///
/// Every handle carries its own writer identity: a registry written through a
/// handle is announced to the feeds of all other handles but never to its own.
pub trait Store: Send {
    /// Current registry. Missing or unreadable content is an empty registry.
    fn load(&self) -> anyhow::Result<Registry>;

    /// Unconditionally replaces the registry and notifies every other peer.
    fn save(&self, registry: &[PeerRecord]) -> anyhow::Result<()>;

    /// Bumps the counter and returns the new value.
    fn allocate_id(&self) -> anyhow::Result<PeerId>;

    /// Drops the registry and the counter.
    fn reset(&self) -> anyhow::Result<()>;

    /// Registry replacements written by other peers from now on.
    fn subscribe(&self) -> anyhow::Result<Box<dyn ChangeFeed>>;
}

pub trait ChangeFeed: Send {
    /// Next pending registry replacement, without waiting.
    fn try_next(&mut self) -> anyhow::Result<Option<Registry>>;
}

pub fn encode_registry(registry: &[PeerRecord]) -> anyhow::Result<String> {
    serde_json::to_string(registry).context("Failed to serialize registry")
}

pub fn decode_registry(raw: Option<&str>) -> Registry {
    let Some(raw) = raw else {
        return Registry::new();
    };
    match serde_json::from_str(raw) {
        Ok(registry) => registry,
        Err(e) => {
            warn!(error = %e, "Stored registry is unreadable, treating it as empty");
            Registry::new()
        }
    }
}

pub fn decode_counter(raw: Option<&str>) -> PeerId {
    let Some(raw) = raw else {
        return 0;
    };
    match raw.trim().parse() {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, "Stored counter is unreadable, restarting at zero");
            0
        }
    }
}
