use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use peer_registry::{
    MemoryBackend, MemoryStore, MetaData, PeerSession, SessionConfig, Shape,
};

static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug")
    }
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .init();
});

pub fn enable_tracing() {
    Lazy::force(&TRACING);
}

/// A peer's window: the geometry it reports and how often its callbacks ran.
#[derive(Clone)]
pub struct TestWindow {
    shape: Arc<Mutex<Shape>>,
    pub shape_changes: Arc<AtomicUsize>,
    pub membership_changes: Arc<AtomicUsize>,
}

impl TestWindow {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            shape: Arc::new(Mutex::new(Shape::new(x, y, 640.0, 480.0))),
            shape_changes: Default::default(),
            membership_changes: Default::default(),
        }
    }

    pub fn move_to(&self, x: f64, y: f64) {
        let mut shape = self.shape.lock();
        shape.x = x;
        shape.y = y;
    }

    pub fn shape(&self) -> Shape {
        *self.shape.lock()
    }

    pub fn shape_changes(&self) -> usize {
        self.shape_changes.load(Ordering::SeqCst)
    }

    pub fn membership_changes(&self) -> usize {
        self.membership_changes.load(Ordering::SeqCst)
    }

    /// A session reporting this window's shape, with both callbacks counted.
    pub fn session(&self, backend: &MemoryBackend, config: &SessionConfig) -> PeerSession<MemoryStore> {
        let shape = self.shape.clone();
        let mut session = PeerSession::new(backend.connect(), move || *shape.lock(), config);
        let shape_changes = self.shape_changes.clone();
        session.set_shape_changed_callback(move |_| {
            shape_changes.fetch_add(1, Ordering::SeqCst);
        });
        let membership_changes = self.membership_changes.clone();
        session.set_membership_changed_callback(move |_| {
            membership_changes.fetch_add(1, Ordering::SeqCst);
        });
        session
    }

    pub fn join(&self, backend: &MemoryBackend) -> PeerSession<MemoryStore> {
        let mut session = self.session(backend, &SessionConfig::default());
        session
            .init(MetaData::default().with_start(false))
            .expect("Failed to join registry");
        session
    }
}
