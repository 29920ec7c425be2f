//! Network reachability signal.
//!
//! Hosts push `NetworkState` transitions into a [`NetworkMonitor`]; consumers
//! either read the current state or subscribe to transitions.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Reachability of the cloud from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkState {
    Up,
    Down,
}

impl NetworkState {
    /// Whether the cloud is reachable.
    pub fn is_up(self) -> bool {
        matches!(self, NetworkState::Up)
    }
}

/// Shared holder of the current network state.
#[derive(Debug)]
pub struct NetworkMonitor {
    state_tx: watch::Sender<NetworkState>,
}

impl NetworkMonitor {
    /// Monitor starting in `initial`.
    pub fn new(initial: NetworkState) -> Self {
        let (state_tx, _state_rx) = watch::channel(initial);
        Self { state_tx }
    }

    /// Last reported state.
    pub fn current(&self) -> NetworkState {
        *self.state_tx.borrow()
    }

    /// Whether the last reported state is `Up`.
    pub fn is_up(&self) -> bool {
        self.current().is_up()
    }

    /// Record a new state. Subscribers are only woken on actual transitions.
    pub fn set_state(&self, state: NetworkState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            tracing::debug!(?state, "Network state changed");
        }
    }

    /// Receiver that observes transitions after this call.
    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.state_tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkState::Up)
    }
}
