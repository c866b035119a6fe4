use anyhow::Context;
use peer_registry::{MetaData, PeerId, PeerRunner, PeerSession, Store};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::{db::DbPool, settings::PeerSettings, spawn_blocking_with_tracing, store::PgStore};

/// One peer process: joins the shared registry and republishes its window
/// every tick until interrupted.
pub struct Application {
    runner: PeerRunner<PgStore>,
}

impl Application {
    pub fn build(settings: &PeerSettings, pool: DbPool) -> Result<Self, anyhow::Error> {
        let config = settings.session_config();
        let shape = settings.shape;
        let mut session = PeerSession::new(PgStore::connect(pool), move || shape, &config);
        session.set_shape_changed_callback(|record| {
            debug!(id = record.id(), shape = %record.shape(), "Window shape changed");
        });
        session.set_membership_changed_callback(|registry| {
            info!(peers = registry.len(), "Windows updated");
        });

        let runner = PeerRunner::new(session, &config).on_tick(watch_meta_data());
        Ok(Self { runner })
    }

    pub fn shutdown_handle(&mut self) -> oneshot::Sender<()> {
        self.runner.shutdown_handle()
    }

    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        let session = self.runner.run().await?;
        info!(id = ?session.id(), "Peer stopped");
        Ok(())
    }
}

/// Logs the metadata of every peer whenever any of it changes.
fn watch_meta_data() -> impl FnMut(&mut PeerSession<PgStore>) -> peer_registry::Result<()> + Send
{
    let mut last: Vec<(PeerId, MetaData)> = Vec::new();
    move |session| {
        let current: Vec<_> = session
            .registry()
            .iter()
            .map(|r| (r.id(), r.meta_data().clone()))
            .collect();
        if current != last {
            debug!(peers = ?current, "Peer metadata");
            last = current;
        }
        Ok(())
    }
}

/// Clears every record and the id counter. Only safe while no peer is running.
pub async fn reset_store(pool: DbPool) -> Result<(), anyhow::Error> {
    spawn_blocking_with_tracing(move || PgStore::connect(pool).reset())
        .await
        .context("Failed to spawn blocking task.")??;
    info!("Registry store cleared");
    Ok(())
}
