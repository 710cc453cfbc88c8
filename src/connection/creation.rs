//! Process-wide connection-creation observers.
//!
//! One explicit registry, reachable through [`creation_registry`], is
//! notified whenever a [`Connection`](super::Connection) is constructed —
//! constructed, not connected. Observers register and remove themselves by
//! handle; there is no other process-global state besides this accessor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::ConnectionIdentity;

/// Observer of new connection instances.
pub trait ConnectionCreationObserver: Send + Sync {
    fn connection_created(&self, identity: ConnectionIdentity);
}

/// Stable identity of a registered creation observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

impl fmt::Display for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry of connection-creation observers.
pub struct CreationRegistry {
    observers: DashMap<ObserverHandle, Arc<dyn ConnectionCreationObserver>>,
    next_handle: AtomicU64,
}

impl CreationRegistry {
    fn new() -> Self {
        Self {
            observers: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn register(&self, observer: Arc<dyn ConnectionCreationObserver>) -> ObserverHandle {
        let handle = ObserverHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.observers.insert(handle, observer);
        handle
    }

    /// No-op when the handle is absent.
    pub fn remove(&self, handle: ObserverHandle) {
        self.observers.remove(&handle);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub(crate) fn notify(&self, identity: ConnectionIdentity) {
        let snapshot: Vec<Arc<dyn ConnectionCreationObserver>> = self
            .observers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for observer in snapshot {
            observer.connection_created(identity);
        }
    }
}

static REGISTRY: OnceLock<CreationRegistry> = OnceLock::new();

/// The process-scoped creation-observer registry.
pub fn creation_registry() -> &'static CreationRegistry {
    REGISTRY.get_or_init(CreationRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<ConnectionIdentity>>,
    }

    impl ConnectionCreationObserver for Recorder {
        fn connection_created(&self, identity: ConnectionIdentity) {
            self.seen.lock().unwrap().push(identity);
        }
    }

    #[test]
    fn test_register_notify_remove() {
        let registry = CreationRegistry::new();
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });

        let handle = registry.register(recorder.clone());
        registry.notify(ConnectionIdentity::from_raw(7));
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);

        registry.remove(handle);
        registry.remove(handle); // no-op
        registry.notify(ConnectionIdentity::from_raw(8));
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }
}
