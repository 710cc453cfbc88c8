//! Engine-level counters, cheap to bump on the dispatch path and cheap to
//! read at any time.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the dispatch hub and the connection lifecycle.
#[derive(Debug, Default)]
pub struct EngineStats {
    packets_received: AtomicU64,
    packets_sent: AtomicU64,
    dispatch_errors: AtomicU64,
    collector_overflows: AtomicU64,
    abrupt_disconnects: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnects_succeeded: AtomicU64,
}

impl EngineStats {
    pub fn inc_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dispatch_error(&self) {
        self.dispatch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_collector_overflow(&self) {
        self.collector_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_abrupt_disconnect(&self) {
        self.abrupt_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reconnect_success(&self) {
        self.reconnects_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    pub fn dispatch_errors(&self) -> u64 {
        self.dispatch_errors.load(Ordering::Relaxed)
    }

    pub fn collector_overflows(&self) -> u64 {
        self.collector_overflows.load(Ordering::Relaxed)
    }

    pub fn abrupt_disconnects(&self) -> u64 {
        self.abrupt_disconnects.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn reconnects_succeeded(&self) -> u64 {
        self.reconnects_succeeded.load(Ordering::Relaxed)
    }

    /// Consistent-enough point-in-time copy for logging and assertions.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_received: self.packets_received(),
            packets_sent: self.packets_sent(),
            dispatch_errors: self.dispatch_errors(),
            collector_overflows: self.collector_overflows(),
            abrupt_disconnects: self.abrupt_disconnects(),
            reconnect_attempts: self.reconnect_attempts(),
            reconnects_succeeded: self.reconnects_succeeded(),
        }
    }
}

/// Plain copy of [`EngineStats`] at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub dispatch_errors: u64,
    pub collector_overflows: u64,
    pub abrupt_disconnects: u64,
    pub reconnect_attempts: u64,
    pub reconnects_succeeded: u64,
}
