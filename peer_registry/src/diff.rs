use std::{collections::BTreeSet, str::FromStr};

use anyhow::anyhow;

use crate::record::{PeerId, PeerRecord};

/// How an incoming registry is compared against the cached one before the
/// membership callback fires.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DiffStrategy {
    /// Length, then id at every index. Reorders count as changes, metadata
    /// never does.
    #[default]
    Positional,
    /// Compares the sets of ids, ignoring order.
    IdentitySet,
}

impl DiffStrategy {
    pub fn changed(self, prev: &[PeerRecord], next: &[PeerRecord]) -> bool {
        match self {
            DiffStrategy::Positional => registry_changed(prev, next),
            DiffStrategy::IdentitySet => ids(prev) != ids(next),
        }
    }
}

impl FromStr for DiffStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positional" => Ok(DiffStrategy::Positional),
            "identity" => Ok(DiffStrategy::IdentitySet),
            other => Err(anyhow!(
                "Unknown diff strategy '{other}', expected 'positional' or 'identity'"
            )),
        }
    }
}

pub fn registry_changed(prev: &[PeerRecord], next: &[PeerRecord]) -> bool {
    if prev.len() != next.len() {
        return true;
    }
    prev.iter().zip(next).any(|(p, n)| p.id() != n.id())
}

fn ids(registry: &[PeerRecord]) -> BTreeSet<PeerId> {
    registry.iter().map(PeerRecord::id).collect()
}
