//! Listener registry and relay loop

use crate::core::sync::handle_mutex_poison;
use crate::progress::{ProgressError, ProgressResult};
use crate::state::{RunState, StateStore};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

struct ListenerInfo {
    source: String,
    sender: UnboundedSender<RunState>,
    delivered: u64,
    connected_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerStatistics {
    pub source: String,
    pub delivered: u64,
    pub connected_for: std::time::Duration,
}

#[derive(Clone)]
pub struct ProgressFanout {
    store: StateStore,
    listeners: Arc<Mutex<HashMap<String, ListenerInfo>>>,
}

impl ProgressFanout {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a listener; an existing listener with the same id is replaced
    pub fn connect_listener(
        &self,
        listener_id: impl Into<String>,
        source: impl Into<String>,
    ) -> ProgressResult<UnboundedReceiver<RunState>> {
        let listener_id = listener_id.into();
        let source = source.into();
        let (sender, receiver) = unbounded_channel();

        let mut listeners = self.lock()?;
        let info = ListenerInfo {
            source: source.clone(),
            sender,
            delivered: 0,
            connected_at: Instant::now(),
        };
        if let Some(existing) = listeners.insert(listener_id.clone(), info) {
            warn!(
                "Listener '{}' replaced existing connection (source: {} -> {})",
                listener_id, existing.source, source
            );
        } else {
            debug!("Listener '{}' connected from {}", listener_id, source);
        }
        Ok(receiver)
    }

    pub fn disconnect_listener(&self, listener_id: &str) -> ProgressResult<bool> {
        let removed = self.lock()?.remove(listener_id).is_some();
        if removed {
            debug!("Listener '{}' disconnected", listener_id);
        }
        Ok(removed)
    }

    pub fn listener_count(&self) -> usize {
        self.lock().map(|listeners| listeners.len()).unwrap_or(0)
    }

    pub fn listener_statistics(&self, listener_id: &str) -> Option<ListenerStatistics> {
        let listeners = self.lock().ok()?;
        listeners.get(listener_id).map(|info| ListenerStatistics {
            source: info.source.clone(),
            delivered: info.delivered,
            connected_for: info.connected_at.elapsed(),
        })
    }

    /// Send a snapshot to every listener, dropping those that have gone away
    ///
    /// Returns how many listeners received it.
    pub fn broadcast(&self, snapshot: &RunState) -> ProgressResult<usize> {
        let mut listeners = self.lock()?;
        let mut gone = Vec::new();

        for (listener_id, info) in listeners.iter_mut() {
            if info.sender.send(snapshot.clone()).is_ok() {
                info.delivered += 1;
            } else {
                gone.push(listener_id.clone());
            }
        }
        for listener_id in &gone {
            listeners.remove(listener_id);
            debug!("Listener '{}' went away, removed", listener_id);
        }

        Ok(listeners.len())
    }

    /// Subscribe to the store channel and relay until shutdown
    pub async fn run(self, shutdown_rx: broadcast::Receiver<()>) -> ProgressResult<()> {
        let snapshots = self.store.subscribe_progress().await?;
        self.relay(snapshots, shutdown_rx).await;
        Ok(())
    }

    /// Subscribe now, then relay on a background task
    ///
    /// Snapshots published after this returns are guaranteed to be relayed.
    pub async fn spawn(
        self,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> ProgressResult<JoinHandle<()>> {
        let snapshots = self.store.subscribe_progress().await?;
        Ok(tokio::spawn(self.relay(snapshots, shutdown_rx)))
    }

    async fn relay(
        self,
        mut snapshots: broadcast::Receiver<String>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!(
            "Progress fanout relaying '{}'",
            self.store.settings().progress_channel
        );
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Progress fanout stopping");
                    return;
                }
                received = snapshots.recv() => match received {
                    Ok(payload) => self.relay_payload(&payload),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Progress fanout lagging, {} snapshot(s) skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Progress channel closed");
                        return;
                    }
                }
            }
        }
    }

    fn relay_payload(&self, payload: &str) {
        let snapshot: RunState = match serde_json::from_str(payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Ignoring undecodable progress snapshot: {}", e);
                return;
            }
        };
        match self.broadcast(&snapshot) {
            Ok(listeners) => debug!(
                "Relayed progress {}/{} to {} listener(s)",
                snapshot.processed, snapshot.enqueued, listeners
            ),
            Err(e) => warn!("Progress relay failed: {}", e),
        }
    }

    fn lock(
        &self,
    ) -> ProgressResult<std::sync::MutexGuard<'_, HashMap<String, ListenerInfo>>> {
        handle_mutex_poison(self.listeners.lock(), |message| ProgressError::Internal {
            message,
        })
    }
}
