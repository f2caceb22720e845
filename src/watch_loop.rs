//! Drives a [`KeyWatcher`] in its own task and forwards every change to the
//! engine.
//!
//! The loop ends cleanly on the shutdown signal or when the engine drops its
//! receiver. Any `next` error ends it with that error; reconnecting is left to
//! the engine.

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;

use crate::KeyChange;
use crate::KeyWatcher;
use crate::StoreResult;

pub struct WatchLoop {
    watcher: Box<dyn KeyWatcher>,
    change_tx: mpsc::Sender<KeyChange>,
    shutdown_signal: watch::Receiver<()>,
}

impl WatchLoop {
    pub fn new(
        watcher: Box<dyn KeyWatcher>,
        change_tx: mpsc::Sender<KeyChange>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            watcher,
            change_tx,
            shutdown_signal,
        }
    }

    pub async fn run(self) -> StoreResult<()> {
        let mut watcher = self.watcher;
        let change_tx = self.change_tx;
        let mut shutdown_signal = self.shutdown_signal;
        let prefix = watcher.prefix().to_string();
        debug!(%prefix, "watch loop started");

        loop {
            let change = tokio::select! {
                biased;
                _ = shutdown_signal.changed() => {
                    info!(%prefix, "watch loop shutdown signal received");
                    return Ok(());
                }
                _ = change_tx.closed() => {
                    debug!(%prefix, "watch loop receiver dropped");
                    return Ok(());
                }
                change = watcher.next() => change,
            };

            let change = match change {
                Ok(change) => change,
                Err(e) => {
                    error!(%prefix, error = %e, "watch loop stopped");
                    return Err(e);
                }
            };

            trace!(%prefix, key = %change.key, removal = change.is_removal(), "forwarding change");
            // A full channel must not hide the shutdown signal.
            tokio::select! {
                biased;
                _ = shutdown_signal.changed() => {
                    info!(%prefix, "watch loop shutdown signal received");
                    return Ok(());
                }
                sent = change_tx.send(change) => {
                    if sent.is_err() {
                        debug!(%prefix, "watch loop receiver dropped");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Spawns a [`WatchLoop`] on the current runtime
pub fn spawn_watch_loop(
    watcher: Box<dyn KeyWatcher>,
    change_tx: mpsc::Sender<KeyChange>,
    shutdown_signal: watch::Receiver<()>,
) -> JoinHandle<StoreResult<()>> {
    tokio::spawn(WatchLoop::new(watcher, change_tx, shutdown_signal).run())
}
