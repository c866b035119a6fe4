mod diff;
mod error;
pub mod record;
mod runner;
pub mod session;
pub mod store;

pub use diff::{registry_changed, DiffStrategy};
pub use error::Error;
pub use record::{MetaData, PeerId, PeerRecord, Registry, Shape};
pub use runner::PeerRunner;
pub use session::{PeerSession, SessionConfig, SessionConfigBuilder, SessionState, ShapeSource};
pub use store::{memory::MemoryBackend, memory::MemoryStore, ChangeFeed, Store};

pub type Result<T, E = Error> = std::result::Result<T, E>;
