//! Connection lifecycle states and status observers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::error::{Error, TransportError};

/// Lifecycle state of a connection. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; the instance may be (re)connected
    Disconnected,
    /// Transport being established
    Connecting,
    /// Transport up, not authenticated
    Connected,
    /// Login handshake in flight
    Authenticating,
    /// Login complete
    Authenticated,
    /// Explicit disconnect in progress
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "DISCONNECTED"),
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Connected => write!(f, "CONNECTED"),
            ConnectionState::Authenticating => write!(f, "AUTHENTICATING"),
            ConnectionState::Authenticated => write!(f, "AUTHENTICATED"),
            ConnectionState::Closing => write!(f, "CLOSING"),
        }
    }
}

impl ConnectionState {
    /// Check if a transport exists and accepts writes.
    pub fn can_send(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected
                | ConnectionState::Authenticating
                | ConnectionState::Authenticated
        )
    }

    /// Check if the transport is established (connected in the socket sense).
    pub fn is_online(&self) -> bool {
        self.can_send()
    }
}

/// Observer of connection-level status changes.
///
/// All methods default to no-ops so implementations override only what they
/// care about. Abrupt transport errors are delivered here, never to a
/// pending call.
pub trait ConnectionStatusListener: Send + Sync {
    /// Explicit disconnect completed.
    fn connection_closed(&self) {}

    /// The transport dropped without an explicit disconnect.
    fn connection_closed_on_error(&self, _error: &TransportError) {}

    /// A reconnection attempt is scheduled after `delay`.
    fn reconnecting_in(&self, _delay: Duration) {}

    /// The transport was re-established; registries were preserved.
    fn reconnection_succeeded(&self) {}

    /// The reconnection policy gave up. Terminal for automatic recovery.
    fn reconnection_failed(&self, _error: &Error) {}
}

/// Stable identity of a registered status listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusHandle(u64);

impl fmt::Display for StatusHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry of status listeners for one connection.
///
/// Unlike the packet registries, these survive explicit disconnect: terminal
/// reconnection errors must still reach their observers.
pub(crate) struct StatusRegistry {
    entries: DashMap<StatusHandle, Arc<dyn ConnectionStatusListener>>,
    next_handle: AtomicU64,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn add(&self, listener: Arc<dyn ConnectionStatusListener>) -> StatusHandle {
        let handle = StatusHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.entries.insert(handle, listener);
        handle
    }

    pub fn remove(&self, handle: StatusHandle) {
        self.entries.remove(&handle);
    }

    /// Invoke `f` for every registered listener, over a snapshot.
    pub fn each(&self, f: impl Fn(&dyn ConnectionStatusListener)) {
        let snapshot: Vec<Arc<dyn ConnectionStatusListener>> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in snapshot {
            f(listener.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_send() {
        assert!(!ConnectionState::Disconnected.can_send());
        assert!(!ConnectionState::Connecting.can_send());
        assert!(ConnectionState::Connected.can_send());
        assert!(ConnectionState::Authenticating.can_send());
        assert!(ConnectionState::Authenticated.can_send());
        assert!(!ConnectionState::Closing.can_send());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Authenticated.to_string(), "AUTHENTICATED");
        assert_eq!(ConnectionState::Closing.to_string(), "CLOSING");
    }
}
