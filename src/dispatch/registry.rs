//! Handle-keyed listener registries.
//!
//! One registry serves the receive side, another the send side. Entries are
//! keyed by a stable [`ListenerHandle`] allocated at registration time, so
//! re-registering at a handle replaces the filter instead of duplicating the
//! entry. Dispatch iterates over a snapshot: registration and removal are
//! safe while a notification pass is in flight, including from inside a
//! listener callback.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::error;

use crate::error::BoxError;
use crate::packet::{Packet, PacketFilter};
use crate::telemetry::EngineStats;

/// Asynchronous, read-only observer of sent or received packets.
///
/// Errors are isolated by the dispatcher: they are logged and counted, and
/// the remaining observers still run.
pub trait PacketListener: Send + Sync {
    fn process_packet(&self, packet: &Packet) -> Result<(), BoxError>;
}

impl<F> PacketListener for F
where
    F: Fn(&Packet) -> Result<(), BoxError> + Send + Sync,
{
    fn process_packet(&self, packet: &Packet) -> Result<(), BoxError> {
        self(packet)
    }
}

/// Stable identity of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
struct ListenerEntry {
    listener: Arc<dyn PacketListener>,
    filter: Option<Arc<dyn PacketFilter>>,
}

/// Concurrent registry of packet listeners.
pub(crate) struct ListenerRegistry {
    entries: DashMap<ListenerHandle, ListenerEntry>,
    next_handle: AtomicU64,
    /// "receive" or "send", for log context.
    side: &'static str,
}

impl ListenerRegistry {
    pub fn new(side: &'static str) -> Self {
        Self {
            entries: DashMap::new(),
            next_handle: AtomicU64::new(1),
            side,
        }
    }

    /// Register a listener, returning its handle.
    pub fn add(
        &self,
        listener: Arc<dyn PacketListener>,
        filter: Option<Arc<dyn PacketFilter>>,
    ) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.entries.insert(handle, ListenerEntry { listener, filter });
        handle
    }

    /// Replace the entry at `handle`. Returns false when the handle is
    /// unknown; the registry never grows an entry for a foreign handle.
    pub fn replace(
        &self,
        handle: ListenerHandle,
        listener: Arc<dyn PacketListener>,
        filter: Option<Arc<dyn PacketFilter>>,
    ) -> bool {
        match self.entries.get_mut(&handle) {
            Some(mut entry) => {
                *entry = ListenerEntry { listener, filter };
                true
            }
            None => false,
        }
    }

    /// Remove the entry at `handle`. No-op when absent.
    pub fn remove(&self, handle: ListenerHandle) {
        self.entries.remove(&handle);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Invoke every listener whose filter accepts the packet.
    pub fn notify(&self, packet: &Packet, stats: &EngineStats) {
        let snapshot: Vec<(ListenerHandle, ListenerEntry)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (handle, entry) in snapshot {
            let accepted = entry
                .filter
                .as_ref()
                .map(|filter| filter.accept(packet))
                .unwrap_or(true);
            if !accepted {
                continue;
            }

            if let Err(err) = entry.listener.process_packet(packet) {
                stats.inc_dispatch_error();
                error!(
                    target: "xmppc::dispatch",
                    handle = %handle,
                    side = self.side,
                    error = %err,
                    "packet listener failed"
                );
            }
        }
    }
}
