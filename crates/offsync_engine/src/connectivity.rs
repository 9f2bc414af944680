//! Online/offline state and the auto-sync task it drives.

use crate::engine::SyncEngine;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Tracks whether the host believes it is online.
///
/// Clones share state. Changes are published on a `watch` channel, so
/// subscribers observe only the latest value.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with an initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Current state.
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Records a platform signal. Returns true if the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "connectivity changed");
        }
        changed
    }

    /// Receiver for state changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Spawns the auto-sync task.
    ///
    /// The task drains `engine` on every offline-to-online transition and
    /// every `interval` while online. Drains run one at a time on the task.
    pub fn spawn_auto_sync<T: Transport>(
        &self,
        engine: Arc<SyncEngine<T>>,
        interval: Duration,
    ) -> AutoSync {
        let mut changes = self.subscribe();
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            let mut was_online = *changes.borrow_and_update();
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *changes.borrow_and_update();
                        if online && !was_online {
                            run_drain(&engine, "reconnected").await;
                        }
                        was_online = online;
                    }
                    _ = ticker.tick() => {
                        let online = *changes.borrow();
                        if online {
                            run_drain(&engine, "interval").await;
                        }
                    }
                }
            }
            tracing::debug!("auto-sync stopped");
        });

        AutoSync {
            stop: stop_tx,
            handle,
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

async fn run_drain<T: Transport>(engine: &SyncEngine<T>, trigger: &'static str) {
    match engine.drain().await {
        Ok(report) if report.attempted > 0 => {
            tracing::info!(trigger, ?report, "auto-sync drain finished")
        }
        Ok(_) => tracing::trace!(trigger, "auto-sync drain had nothing to do"),
        Err(e) => engine.report_background_failure(&e),
    }
}

/// Handle to the auto-sync task. Dropping it stops the task.
#[derive(Debug)]
pub struct AutoSync {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AutoSync {
    /// Stops the task and waits for the current drain to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }

    /// True once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
