use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use peer_registry::{
    MemoryBackend, MetaData, PeerRecord, PeerRunner, SessionConfigBuilder, SessionState, Store,
};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::helper::{enable_tracing, TestWindow};

#[tokio::test]
async fn runner_joins_ticks_and_leaves() -> anyhow::Result<()> {
    enable_tracing();
    let backend = MemoryBackend::new();
    let config = SessionConfigBuilder::new()
        .tick_interval(Duration::from_millis(5))
        .meta_data(MetaData::default().with_start(false))
        .build();

    let w1 = TestWindow::at(0.0, 0.0);
    let ticks = Arc::new(AtomicUsize::new(0));
    let mut runner = {
        let ticks = ticks.clone();
        PeerRunner::new(w1.session(&backend, &config), &config).on_tick(move |_| {
            ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };
    let shutdown = runner.shutdown_handle();
    let running = tokio::spawn(runner.run());

    sleep(Duration::from_millis(30)).await;
    let w2 = TestWindow::at(700.0, 0.0);
    let mut p2 = w2.join(&backend);
    assert_eq!(p2.registry().len(), 2);

    w1.move_to(50.0, 60.0);
    sleep(Duration::from_millis(50)).await;

    p2.poll_changes()?;
    let moved = p2
        .registry()
        .iter()
        .find(|r| r.id() == 1)
        .map(PeerRecord::shape);
    assert_eq!(moved, Some(w1.shape()));
    assert_eq!(w1.membership_changes(), 1);
    assert!(w1.shape_changes() >= 1);

    shutdown.send(()).expect("Runner stopped early");
    let p1 = running.await??;

    assert_eq!(p1.state(), SessionState::Removed);
    assert!(ticks.load(Ordering::SeqCst) > 0);
    p2.poll_changes()?;
    assert_eq!(w2.membership_changes(), 1);
    assert_eq!(p2.registry().len(), 1);
    assert_eq!(p2.registry()[0].id(), p2.id().unwrap());
    assert_eq!(backend.connect().load()?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn dropping_the_shutdown_handle_stops_the_runner() -> anyhow::Result<()> {
    enable_tracing();
    let backend = MemoryBackend::new();
    let config = SessionConfigBuilder::new()
        .tick_interval(Duration::from_millis(5))
        .build();
    let mut runner = PeerRunner::new(TestWindow::at(0.0, 0.0).session(&backend, &config), &config);
    drop(runner.shutdown_handle());

    let session = runner.run().await?;

    assert_eq!(session.state(), SessionState::Removed);
    assert!(backend.connect().load()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn failing_tick_hook_still_leaves_the_registry() {
    enable_tracing();
    let backend = MemoryBackend::new();
    let config = SessionConfigBuilder::new()
        .tick_interval(Duration::from_millis(5))
        .build();
    let runner = PeerRunner::new(TestWindow::at(0.0, 0.0).session(&backend, &config), &config)
        .on_tick(|_| Err(anyhow::anyhow!("renderer went away").into()));

    let outcome = runner.run().await;

    assert!(outcome.is_err());
    assert!(backend.connect().load().unwrap().is_empty());
}

fn heartbeat(beats: Arc<AtomicUsize>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(Duration::from_millis(5)).await;
            beats.fetch_add(1, Ordering::SeqCst);
        }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn slow_ticks_do_not_stall_other_tasks() -> anyhow::Result<()> {
    enable_tracing();
    let backend = MemoryBackend::new();
    let config = SessionConfigBuilder::new()
        .tick_interval(Duration::from_millis(5))
        .build();
    let beats = Arc::new(AtomicUsize::new(0));
    let pulse = heartbeat(beats.clone());

    let during_slow_tick = Arc::new(AtomicUsize::new(0));
    let mut runner = {
        let (beats, during_slow_tick) = (beats.clone(), during_slow_tick.clone());
        let mut slowed = false;
        PeerRunner::new(TestWindow::at(0.0, 0.0).session(&backend, &config), &config).on_tick(
            move |_| {
                if !slowed {
                    slowed = true;
                    let before = beats.load(Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(100));
                    during_slow_tick.store(beats.load(Ordering::SeqCst) - before, Ordering::SeqCst);
                }
                Ok(())
            },
        )
    };
    let shutdown = runner.shutdown_handle();
    let running = tokio::spawn(runner.run());

    sleep(Duration::from_millis(200)).await;
    shutdown.send(()).expect("Runner stopped early");
    let session = running.await??;
    pulse.abort();

    assert_eq!(session.state(), SessionState::Removed);
    assert!(during_slow_tick.load(Ordering::SeqCst) > 0);
    assert!(backend.connect().load()?.is_empty());
    Ok(())
}
