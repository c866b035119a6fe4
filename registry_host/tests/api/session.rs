use std::time::Duration;

use peer_registry::{MetaData, PeerRecord, SessionState, Shape, Store};
use registry_host::{application::Application, settings::PeerSettings};
use tokio::time::sleep;

use crate::helper::{enable_tracing, TestRegistry};

fn ids(registry: &[PeerRecord]) -> Vec<u64> {
    registry.iter().map(PeerRecord::id).collect()
}

#[test]
fn two_peers_share_one_database() {
    enable_tracing();
    let app = TestRegistry::new();
    let mut p1 = app.join(Shape::new(0.0, 0.0, 640.0, 480.0));
    let mut p2 = app.join(Shape::new(640.0, 0.0, 640.0, 480.0));

    assert_eq!(p1.poll_changes().unwrap(), 1);
    assert_eq!(ids(p1.registry()), vec![1, 2]);

    p1.set_this_peer_meta_data(MetaData::default().with_start(true))
        .unwrap();
    assert_eq!(p2.poll_changes().unwrap(), 1);
    assert_eq!(p2.registry()[0].meta_data().start, Some(true));

    assert!(!p2.update(None).unwrap());
    assert_eq!(p1.poll_changes().unwrap(), 0);

    p2.terminate().unwrap();
    assert_eq!(p2.state(), SessionState::Removed);
    assert_eq!(p1.poll_changes().unwrap(), 1);
    assert_eq!(ids(p1.registry()), vec![1]);
    assert_eq!(ids(&app.store().load().unwrap()), vec![1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn application_leaves_on_shutdown() -> anyhow::Result<()> {
    enable_tracing();
    let app = TestRegistry::new();
    let settings = PeerSettings {
        tick_ms: 5,
        ..Default::default()
    };
    let mut application = Application::build(&settings, app.pool.clone())?;
    let shutdown = application.shutdown_handle();
    let running = tokio::spawn(application.run_until_stopped());

    sleep(Duration::from_millis(100)).await;
    let registry = app.store().load()?;
    assert_eq!(registry.len(), 1);
    assert_eq!(registry[0].shape(), settings.shape);

    shutdown.send(()).expect("Application stopped early");
    running.await??;
    assert!(app.store().load()?.is_empty());
    Ok(())
}
