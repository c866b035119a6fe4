use std::fmt;

use tracing::{debug, info, warn};

use crate::{
    diff::DiffStrategy,
    record::{MetaData, PeerId, PeerRecord, Registry, Shape},
    store::{ChangeFeed, Store},
    Error, Result,
};

mod config;
pub use config::{SessionConfig, SessionConfigBuilder, DEFAULT_TICK_INTERVAL};

/// Where the session samples its own geometry from.
pub trait ShapeSource: Send {
    fn shape(&self) -> Shape;
}

impl<F> ShapeSource for F
where
    F: Fn() -> Shape + Send,
{
    fn shape(&self) -> Shape {
        self()
    }
}

pub type ShapeChangedCallback = Box<dyn FnMut(&PeerRecord) + Send>;
pub type MembershipChangedCallback = Box<dyn FnMut(&[PeerRecord]) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Removed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Active => write!(f, "active"),
            SessionState::Removed => write!(f, "removed"),
        }
    }
}

enum Phase {
    Uninitialized,
    Active {
        record: PeerRecord,
        feed: Box<dyn ChangeFeed>,
    },
    Removed {
        record: PeerRecord,
    },
}

/// This process's membership in the shared registry.
///
/// The session owns exactly one record. It republishes that record when the
/// local shape or metadata changes and keeps a cached copy of the whole
/// registry, refreshed from the change feed by [`PeerSession::poll_changes`].
/// All callbacks run synchronously inside the session call that triggers them.
pub struct PeerSession<S> {
    store: S,
    shape_source: Box<dyn ShapeSource>,
    diff: DiffStrategy,
    phase: Phase,
    registry: Registry,
    on_shape_changed: Option<ShapeChangedCallback>,
    on_membership_changed: Option<MembershipChangedCallback>,
}

impl<S> fmt::Debug for PeerSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("state", &self.state())
            .field("id", &self.id())
            .field("diff", &self.diff)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<S: Store> PeerSession<S> {
    pub fn new<F>(store: S, shape_source: F, config: &SessionConfig) -> Self
    where
        F: ShapeSource + 'static,
    {
        Self {
            store,
            shape_source: Box::new(shape_source),
            diff: config.diff,
            phase: Phase::Uninitialized,
            registry: Registry::new(),
            on_shape_changed: None,
            on_membership_changed: None,
        }
    }

    /// Joins the registry with a freshly allocated id.
    #[tracing::instrument(name = "Join registry", skip(self, meta_data))]
    pub fn init(&mut self, meta_data: MetaData) -> Result<()> {
        if !matches!(self.phase, Phase::Uninitialized) {
            return Err(self.invalid("init"));
        }
        let shape = checked_shape(self.shape_source.as_ref())?;
        check_meta_data(&meta_data)?;
        let id = self.store.allocate_id().map_err(Error::Store)?;
        let record = PeerRecord::new(id, shape, meta_data);

        let mut registry = self.store.load().map_err(Error::Store)?;
        registry.push(record.clone());
        self.store.save(&registry).map_err(Error::Store)?;
        let feed = self.store.subscribe().map_err(Error::Store)?;

        info!(id, peers = registry.len(), "Joined registry");
        self.registry = registry;
        self.phase = Phase::Active { record, feed };
        Ok(())
    }

    /// Republishes this peer if its shape moved or `meta_data` differs from
    /// what is published. Returns whether anything was written.
    pub fn update(&mut self, meta_data: Option<MetaData>) -> Result<bool> {
        let state = self.state();
        let Phase::Active { record, .. } = &mut self.phase else {
            return Err(Error::InvalidState {
                operation: "update",
                state,
            });
        };
        let shape = checked_shape(self.shape_source.as_ref())?;
        if let Some(meta_data) = &meta_data {
            check_meta_data(meta_data)?;
        }

        let meta_changed = meta_data
            .as_ref()
            .is_some_and(|meta| meta != record.meta_data());
        if shape == record.shape() && !meta_changed {
            return Ok(false);
        }

        record.set_shape(shape);
        if let Some(meta_data) = meta_data {
            record.set_meta_data(meta_data);
        }
        let record = record.clone();

        match self.registry.iter_mut().find(|r| r.id() == record.id()) {
            Some(entry) => *entry = record.clone(),
            None => warn!(id = record.id(), "Own record missing from cached registry"),
        }
        if let Some(callback) = self.on_shape_changed.as_mut() {
            callback(&record);
        }
        self.store.save(&self.registry).map_err(Error::Store)?;
        debug!(id = record.id(), shape = %record.shape(), "Published update");
        Ok(true)
    }

    /// Merges `partial` over the published metadata and republishes.
    pub fn set_this_peer_meta_data(&mut self, partial: MetaData) -> Result<bool> {
        let merged = match &self.phase {
            Phase::Active { record, .. } => record.meta_data().merged(partial),
            _ => return Err(self.invalid("set metadata on")),
        };
        self.update(Some(merged))
    }

    /// Applies every registry replacement other peers wrote since the last
    /// call. Returns how many were applied.
    pub fn poll_changes(&mut self) -> Result<usize> {
        let state = self.state();
        let Phase::Active { feed, .. } = &mut self.phase else {
            return Err(Error::InvalidState {
                operation: "poll changes of",
                state,
            });
        };

        let mut pending = Vec::new();
        while let Some(registry) = feed.try_next().map_err(Error::Store)? {
            pending.push(registry);
        }
        let applied = pending.len();
        for registry in pending {
            self.on_external_change(registry);
        }
        Ok(applied)
    }

    fn on_external_change(&mut self, registry: Registry) {
        let changed = self.diff.changed(&self.registry, &registry);
        self.registry = registry;
        if changed {
            debug!(peers = self.registry.len(), "Registry membership changed");
            if let Some(callback) = self.on_membership_changed.as_mut() {
                callback(&self.registry);
            }
        }
    }

    /// Removes this peer's record. The session is unusable afterwards.
    #[tracing::instrument(name = "Leave registry", skip(self), fields(id = ?self.id()))]
    pub fn terminate(&mut self) -> Result<()> {
        let record = match std::mem::replace(&mut self.phase, Phase::Uninitialized) {
            Phase::Active { record, feed } => {
                drop(feed);
                record
            }
            other => {
                self.phase = other;
                return Err(self.invalid("terminate"));
            }
        };
        let id = record.id();
        self.phase = Phase::Removed { record };

        match self.registry.iter().position(|r| r.id() == id) {
            Some(index) => {
                self.registry.remove(index);
            }
            None => warn!(id, "Own record already gone from cached registry"),
        }
        self.store.save(&self.registry).map_err(Error::Store)?;
        info!(id, peers = self.registry.len(), "Left registry");
        Ok(())
    }

    pub fn set_shape_changed_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&PeerRecord) + Send + 'static,
    {
        self.on_shape_changed = Some(Box::new(callback));
    }

    pub fn set_membership_changed_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&[PeerRecord]) + Send + 'static,
    {
        self.on_membership_changed = Some(Box::new(callback));
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> PeerSession<S> {
    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Uninitialized => SessionState::Uninitialized,
            Phase::Active { .. } => SessionState::Active,
            Phase::Removed { .. } => SessionState::Removed,
        }
    }

    pub fn id(&self) -> Option<PeerId> {
        self.this_peer().map(PeerRecord::id)
    }

    /// This peer's record as last published.
    pub fn this_peer(&self) -> Option<&PeerRecord> {
        match &self.phase {
            Phase::Uninitialized => None,
            Phase::Active { record, .. } | Phase::Removed { record } => Some(record),
        }
    }

    /// The cached view of every peer, intended to be read once per tick.
    pub fn registry(&self) -> &[PeerRecord] {
        &self.registry
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state(),
        }
    }
}

/// Samples the source, refusing geometry that cannot be encoded. A rejected
/// sample leaves the published record untouched.
fn checked_shape(source: &dyn ShapeSource) -> Result<Shape> {
    let shape = source.shape();
    if !shape.is_finite() {
        warn!(%shape, "Window reported a non-finite shape");
        return Err(Error::InvalidShape(shape));
    }
    Ok(shape)
}

fn check_meta_data(meta_data: &MetaData) -> Result<()> {
    match meta_data.non_finite_key() {
        Some(key) => Err(Error::NonFiniteMetaData(key)),
        None => Ok(()),
    }
}
