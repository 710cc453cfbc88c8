//! Packet collectors: a blocking request/response idiom over the inbound
//! stream.
//!
//! A collector pairs a filter with a bounded queue fed by inbound dispatch.
//! Call sites that need one matching reply ("send an IQ, wait for its
//! result") create a collector, send, await [`PacketCollector::next_result`],
//! and cancel — no full listener registration required.
//!
//! The engine keeps a strong reference to every active collector until it is
//! cancelled: dropping the handle without cancelling leaks the queue and its
//! backlog by design of the ownership contract.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::warn;

use crate::packet::{Packet, PacketFilter};
use crate::telemetry::EngineStats;

pub(crate) struct CollectorShared {
    id: u64,
    filter: Option<Arc<dyn PacketFilter>>,
    queue: Mutex<VecDeque<Packet>>,
    notify: Notify,
    cancelled: AtomicBool,
    capacity: usize,
}

impl CollectorShared {
    /// Enqueue the packet if the filter accepts it. The queue bound is
    /// enforced by dropping the oldest entry; the reader never blocks here.
    fn offer(&self, packet: &Packet, stats: &EngineStats) {
        let accepted = self
            .filter
            .as_ref()
            .map(|filter| filter.accept(packet))
            .unwrap_or(true);
        if !accepted || self.cancelled.load(Ordering::Acquire) {
            return;
        }

        {
            let mut queue = self.queue.lock().unwrap();
            if queue.len() == self.capacity {
                queue.pop_front();
                stats.inc_collector_overflow();
                warn!(
                    target: "xmppc::dispatch",
                    collector = self.id,
                    capacity = self.capacity,
                    "collector queue full, dropping oldest packet"
                );
            }
            queue.push_back(packet.clone());
        }
        self.notify.notify_waiters();
    }

    fn pop(&self) -> Option<Packet> {
        self.queue.lock().unwrap().pop_front()
    }

    fn cancel(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::AcqRel);
        if first {
            self.queue.lock().unwrap().clear();
            self.notify.notify_waiters();
        }
        first
    }
}

/// Handle to an active collector.
pub struct PacketCollector {
    shared: Arc<CollectorShared>,
    set: Weak<CollectorSet>,
}

impl PacketCollector {
    /// Wait indefinitely for the next matching packet. Returns `None` once
    /// the collector is cancelled (directly or by connection teardown).
    pub async fn next_result(&self) -> Option<Packet> {
        loop {
            let notified = self.shared.notify.notified();
            if self.shared.cancelled.load(Ordering::Acquire) {
                return None;
            }
            if let Some(packet) = self.shared.pop() {
                return Some(packet);
            }
            notified.await;
        }
    }

    /// Wait up to `timeout` for the next matching packet. Expiry returns
    /// `None` without error.
    pub async fn next_result_timeout(&self, timeout: Duration) -> Option<Packet> {
        tokio::time::timeout(timeout, self.next_result())
            .await
            .unwrap_or(None)
    }

    /// Non-blocking: the next queued packet, if any.
    pub fn poll_result(&self) -> Option<Packet> {
        if self.shared.cancelled.load(Ordering::Acquire) {
            return None;
        }
        self.shared.pop()
    }

    /// Deregister from the engine and release the queue. Idempotent; wakes
    /// any blocked `next_result` caller.
    pub fn cancel(&self) {
        if self.shared.cancel() {
            if let Some(set) = self.set.upgrade() {
                set.active.remove(&self.shared.id);
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for PacketCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketCollector")
            .field("id", &self.shared.id)
            .field("cancelled", &self.shared.cancelled.load(Ordering::Acquire))
            .finish()
    }
}

/// The engine-owned set of active collectors.
pub(crate) struct CollectorSet {
    active: DashMap<u64, Arc<CollectorShared>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl CollectorSet {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            active: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity,
        })
    }

    pub fn create(self: &Arc<Self>, filter: Option<Arc<dyn PacketFilter>>) -> PacketCollector {
        let shared = Arc::new(CollectorShared {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            filter,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            cancelled: AtomicBool::new(false),
            capacity: self.capacity,
        });
        self.active.insert(shared.id, Arc::clone(&shared));
        PacketCollector {
            shared,
            set: Arc::downgrade(self),
        }
    }

    /// Offer one inbound packet to every active collector.
    pub fn offer_all(&self, packet: &Packet, stats: &EngineStats) {
        for entry in self.active.iter() {
            entry.value().offer(packet, stats);
        }
    }

    /// Cancel every active collector, waking blocked waiters.
    pub fn cancel_all(&self) {
        for entry in self.active.iter() {
            entry.value().cancel();
        }
        self.active.clear();
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }
}
