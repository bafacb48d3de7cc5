//! Background persistence loop.
//!
//! Runs registered save callbacks in order on a fixed interval. Stopping is
//! cooperative: the loop waits on a watch channel alongside its sleep, so a
//! stop lands within one interval and never interrupts a round in flight.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::errors::RegistryError;

pub type BoxedSaveFuture = Pin<Box<dyn Future<Output = Result<(), RegistryError>> + Send>>;
/// A save routine the daemon drives once per round.
pub type SaveCallback = Arc<dyn Fn() -> BoxedSaveFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Idle,
    Running,
    /// Terminal; a stopped daemon never runs again.
    Stopped,
}

struct DaemonInner {
    state: Mutex<DaemonState>,
    callbacks: Mutex<Vec<SaveCallback>>,
    interval: Mutex<Duration>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

/// Cheap-clone handle over the daemon state.
#[derive(Clone)]
pub struct SaveDaemon {
    inner: Arc<DaemonInner>,
}

impl SaveDaemon {
    pub fn new(interval: Duration) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            inner: Arc::new(DaemonInner {
                state: Mutex::new(DaemonState::Idle),
                callbacks: Mutex::new(Vec::new()),
                interval: Mutex::new(interval),
                stop_tx,
                stop_rx,
            }),
        }
    }

    /// Append a callback; allowed before or after `start`. The loop copies
    /// the list each round, so appends never corrupt an iteration in flight.
    pub async fn add_callback(&self, callback: SaveCallback) {
        self.inner.callbacks.lock().await.push(callback);
    }

    pub async fn state(&self) -> DaemonState {
        *self.inner.state.lock().await
    }

    pub async fn interval(&self) -> Duration {
        *self.inner.interval.lock().await
    }

    /// Begin the periodic loop on a background task. `interval_override`
    /// replaces the configured interval before the first round.
    pub async fn start(&self, interval_override: Option<Duration>) -> Result<(), RegistryError> {
        {
            let mut state = self.inner.state.lock().await;
            match *state {
                DaemonState::Idle => *state = DaemonState::Running,
                DaemonState::Running => {
                    return Err(RegistryError::Validation(
                        "save daemon is already running".to_string(),
                    ))
                }
                DaemonState::Stopped => {
                    return Err(RegistryError::Validation(
                        "a stopped save daemon cannot be restarted".to_string(),
                    ))
                }
            }
        }
        if let Some(interval) = interval_override {
            *self.inner.interval.lock().await = interval;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_loop(inner));
        Ok(())
    }

    /// Signal the loop to stop. Cooperative: at most one more full round of
    /// callbacks runs before the loop halts for good.
    pub fn stop(&self) {
        let _ = self.inner.stop_tx.send(true);
    }
}

async fn run_loop(inner: Arc<DaemonInner>) {
    info!("save daemon started");
    let mut stop_rx = inner.stop_rx.clone();
    loop {
        if *stop_rx.borrow() {
            break;
        }
        let callbacks = inner.callbacks.lock().await.clone();
        debug!(count = callbacks.len(), "running save round");
        for callback in &callbacks {
            if let Err(e) = callback().await {
                error!(error = %e, "save callback failed");
            }
        }
        let interval = *inner.interval.lock().await;
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = sleep(interval) => {}
        }
    }
    *inner.state.lock().await = DaemonState::Stopped;
    info!("save daemon stopped");
}
