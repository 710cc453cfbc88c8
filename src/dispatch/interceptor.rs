//! Ordered pre-send interceptor chain.
//!
//! Interceptors run synchronously on the sender's task, in registration
//! order, each free to mutate the packet before the next one sees it. They
//! block the send call, so they must complete quickly.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::error;

use crate::error::BoxError;
use crate::packet::{Packet, PacketFilter};
use crate::telemetry::EngineStats;

/// Synchronous, mutation-capable pre-send observer.
///
/// Errors are isolated: the failing interceptor is logged and counted, the
/// rest of the chain still runs.
pub trait PacketInterceptor: Send + Sync {
    fn intercept(&self, packet: &mut Packet) -> Result<(), BoxError>;
}

impl<F> PacketInterceptor for F
where
    F: Fn(&mut Packet) -> Result<(), BoxError> + Send + Sync,
{
    fn intercept(&self, packet: &mut Packet) -> Result<(), BoxError> {
        self(packet)
    }
}

/// Stable identity of a registered interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorHandle(u64);

impl fmt::Display for InterceptorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
struct InterceptorEntry {
    interceptor: Arc<dyn PacketInterceptor>,
    filter: Option<Arc<dyn PacketFilter>>,
}

/// Registration-ordered interceptor chain.
pub(crate) struct InterceptorChain {
    entries: RwLock<Vec<(InterceptorHandle, InterceptorEntry)>>,
    next_handle: AtomicU64,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    pub fn add(
        &self,
        interceptor: Arc<dyn PacketInterceptor>,
        filter: Option<Arc<dyn PacketFilter>>,
    ) -> InterceptorHandle {
        let handle = InterceptorHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.entries
            .write()
            .unwrap()
            .push((handle, InterceptorEntry { interceptor, filter }));
        handle
    }

    /// Replace the entry at `handle`, keeping its chain position. Returns
    /// false when the handle is unknown.
    pub fn replace(
        &self,
        handle: InterceptorHandle,
        interceptor: Arc<dyn PacketInterceptor>,
        filter: Option<Arc<dyn PacketFilter>>,
    ) -> bool {
        let mut entries = self.entries.write().unwrap();
        match entries.iter_mut().find(|(h, _)| *h == handle) {
            Some((_, entry)) => {
                *entry = InterceptorEntry { interceptor, filter };
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, handle: InterceptorHandle) {
        self.entries.write().unwrap().retain(|(h, _)| *h != handle);
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Run the chain over a packet about to be sent.
    pub fn run(&self, packet: &mut Packet, stats: &EngineStats) {
        // Snapshot under the read lock so interceptors may register or
        // remove entries without deadlocking the pass that invoked them.
        let snapshot: Vec<(InterceptorHandle, InterceptorEntry)> =
            self.entries.read().unwrap().clone();

        for (handle, entry) in snapshot {
            let accepted = entry
                .filter
                .as_ref()
                .map(|filter| filter.accept(packet))
                .unwrap_or(true);
            if !accepted {
                continue;
            }

            if let Err(err) = entry.interceptor.intercept(packet) {
                stats.inc_dispatch_error();
                error!(
                    target: "xmppc::dispatch",
                    handle = %handle,
                    error = %err,
                    "packet interceptor failed"
                );
            }
        }
    }
}
