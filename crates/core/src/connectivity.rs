//! Network reachability as seen by the delivery coordinator.
//!
//! The host's platform glue feeds a [`ReachabilityMonitor`] with OS
//! reachability callbacks; the coordinator only reads the current status and
//! listens for transitions.

use tokio::sync::watch;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkKind {
    Wifi,
    Wwan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectivityState {
    Offline,
    Online(NetworkKind),
}

impl ConnectivityState {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online(_))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online(NetworkKind::Wifi) => "online_wifi",
            Self::Online(NetworkKind::Wwan) => "online_wwan",
        }
    }
}

pub trait ConnectivityMonitor: Send + Sync {
    fn current_status(&self) -> ConnectivityState;

    /// Receiver that wakes on every status transition after subscription.
    fn subscribe(&self) -> watch::Receiver<ConnectivityState>;
}

/// Process-wide monitor driven by platform reachability callbacks.
#[derive(Debug)]
pub struct ReachabilityMonitor {
    sender: watch::Sender<ConnectivityState>,
}

impl ReachabilityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (sender, _receiver) = watch::channel(initial);
        Self { sender }
    }

    /// Records a platform observation. Returns `true` when it changed the status;
    /// repeated reports of the same status do not notify subscribers.
    pub fn report(&self, state: ConnectivityState) -> bool {
        let mut previous = state;
        let changed = self.sender.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            previous = *current;
            *current = state;
            true
        });

        if changed {
            info!(
                event_name = "connectivity.status.changed",
                from = previous.as_str(),
                to = state.as_str(),
                "network reachability changed"
            );
        }
        changed
    }
}

impl Default for ReachabilityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Offline)
    }
}

impl ConnectivityMonitor for ReachabilityMonitor {
    fn current_status(&self) -> ConnectivityState {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.sender.subscribe()
    }
}

/// Fixed status that never notifies. Useful for tests and for hosts without reachability APIs.
#[derive(Debug)]
pub struct StaticConnectivity {
    sender: watch::Sender<ConnectivityState>,
}

impl StaticConnectivity {
    pub fn new(state: ConnectivityState) -> Self {
        let (sender, _receiver) = watch::channel(state);
        Self { sender }
    }

    pub fn online() -> Self {
        Self::new(ConnectivityState::Online(NetworkKind::Wifi))
    }

    pub fn offline() -> Self {
        Self::new(ConnectivityState::Offline)
    }
}

impl ConnectivityMonitor for StaticConnectivity {
    fn current_status(&self) -> ConnectivityState {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        ConnectivityMonitor, ConnectivityState, NetworkKind, ReachabilityMonitor,
        StaticConnectivity,
    };

    #[test]
    fn both_network_kinds_count_as_online() {
        assert!(ConnectivityState::Online(NetworkKind::Wifi).is_online());
        assert!(ConnectivityState::Online(NetworkKind::Wwan).is_online());
        assert!(!ConnectivityState::Offline.is_online());
    }

    #[tokio::test]
    async fn report_notifies_subscribers_on_transition() {
        let monitor = ReachabilityMonitor::new(ConnectivityState::Offline);
        let mut receiver = monitor.subscribe();

        assert!(monitor.report(ConnectivityState::Online(NetworkKind::Wwan)));

        receiver.changed().await.expect("sender alive");
        assert_eq!(*receiver.borrow_and_update(), ConnectivityState::Online(NetworkKind::Wwan));
        assert_eq!(monitor.current_status(), ConnectivityState::Online(NetworkKind::Wwan));
    }

    #[tokio::test]
    async fn repeated_status_is_not_a_transition() {
        let monitor = ReachabilityMonitor::new(ConnectivityState::Online(NetworkKind::Wifi));
        let mut receiver = monitor.subscribe();

        assert!(!monitor.report(ConnectivityState::Online(NetworkKind::Wifi)));

        let waited = tokio::time::timeout(Duration::from_millis(50), receiver.changed()).await;
        assert!(waited.is_err(), "no notification expected for an unchanged status");
    }

    #[tokio::test]
    async fn static_connectivity_never_changes() {
        let monitor = StaticConnectivity::offline();
        let mut receiver = monitor.subscribe();

        let waited = tokio::time::timeout(Duration::from_millis(50), receiver.changed()).await;

        assert!(waited.is_err());
        assert_eq!(monitor.current_status(), ConnectivityState::Offline);
    }
}
