use std::time::Duration;

use anyhow::Context;
use tokio::{
    runtime::{Handle, RuntimeFlavor},
    select,
    sync::oneshot,
    task,
    time::{self, MissedTickBehavior},
};
use tracing::{error, info};

use crate::{
    record::MetaData,
    session::{PeerSession, SessionConfig, SessionState},
    store::Store,
    Result,
};

pub type TickHook<S> = Box<dyn FnMut(&mut PeerSession<S>) -> Result<()> + Send>;

/// Drives a session on a fixed tick until ctrl-c or an explicit shutdown.
///
/// Every tick applies pending registry changes, republishes this peer if its
/// shape moved and then hands the session to the tick hook. On the way out the
/// peer removes itself from the registry.
pub struct PeerRunner<S> {
    session: PeerSession<S>,
    tick_interval: Duration,
    meta_data: MetaData,
    on_tick: Option<TickHook<S>>,
    shutdown: Option<oneshot::Receiver<()>>,
}

impl<S: Store> PeerRunner<S> {
    pub fn new(session: PeerSession<S>, config: &SessionConfig) -> Self {
        Self {
            session,
            tick_interval: config.tick_interval,
            meta_data: config.meta_data.clone(),
            on_tick: None,
            shutdown: None,
        }
    }

    pub fn on_tick<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut PeerSession<S>) -> Result<()> + Send + 'static,
    {
        self.on_tick = Some(Box::new(hook));
        self
    }

    /// Stops the runner when fired or dropped. Replaces any earlier handle.
    pub fn shutdown_handle(&mut self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.shutdown = Some(rx);
        tx
    }

    pub fn session(&self) -> &PeerSession<S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut PeerSession<S> {
        &mut self.session
    }

    /// Joins if needed and ticks until told to stop. Returns the departed
    /// session.
    pub async fn run(mut self) -> Result<PeerSession<S>> {
        if self.session.state() == SessionState::Uninitialized {
            let meta_data = self.meta_data.clone();
            blocking(|| self.session.init(meta_data))?;
        }

        let mut on_tick = self.on_tick.take();
        let shutdown = self.shutdown.take();
        let shutdown = async move {
            match shutdown {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(shutdown);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let outcome = loop {
            select! {
                _ = ticker.tick() => {
                    if let Err(e) = blocking(|| self.tick(on_tick.as_mut())) {
                        error!(error = %e, "Tick failed, leaving registry");
                        break Err(e);
                    }
                }
                res = &mut ctrl_c => {
                    if let Err(e) = res.context("Failed to listen for ctrl-c") {
                        break Err(e.into());
                    }
                    info!("Interrupted, leaving registry");
                    break Ok(());
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested, leaving registry");
                    break Ok(());
                }
            }
        };

        let left = match self.session.state() {
            SessionState::Active => blocking(|| self.session.terminate()),
            _ => Ok(()),
        };
        match (outcome, left) {
            (Err(e), Err(left)) => {
                error!(error = %left, "Failed to leave registry");
                Err(e)
            }
            (outcome, left) => outcome.and(left).map(|()| self.session),
        }
    }

    fn tick(&mut self, on_tick: Option<&mut TickHook<S>>) -> Result<()> {
        self.session.poll_changes()?;
        self.session.update(None)?;
        if let Some(hook) = on_tick {
            hook(&mut self.session)?;
        }
        Ok(())
    }
}

/// Session calls block on the store. On a multi-thread runtime the worker is
/// handed off first so other tasks keep running.
fn blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            task::block_in_place(f)
        }
        _ => f(),
    }
}
