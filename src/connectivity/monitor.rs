//! Online/offline state tracking.
//!
//! # Responsibilities
//! - Hold the current connectivity state
//! - Accept transitions from the runtime's connectivity signal
//! - Notify subscribers once per actual transition
//!
//! # Design Decisions
//! - No polling; the embedding runtime reports changes
//! - Reporting the current state again is a no-op

use std::sync::Arc;

use tokio::sync::watch;

/// Connectivity state shared by the dispatcher and its replay worker.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// Create a monitor starting in the given state.
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report the runtime's connectivity. Returns true if this was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            if online {
                tracing::info!("Connectivity restored");
            } else {
                tracing::warn!("Connectivity lost");
            }
        }
        changed
    }

    /// Subscribe to transitions. The receiver sees each change once.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Wait until the next offline → online transition.
    pub async fn wait_online(rx: &mut watch::Receiver<bool>) -> bool {
        loop {
            if rx.changed().await.is_err() {
                return false;
            }
            if *rx.borrow_and_update() {
                return true;
            }
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
