//! Pluggable traffic inspection.
//!
//! A debugger is chosen when the connection is built and installed at most
//! once per instance. It observes traffic on both directions without
//! altering packet content or dispatch ordering.

use tracing::debug;

use crate::connection::ConnectionIdentity;
use crate::packet::Packet;

/// Traffic inspection strategy.
pub trait PacketDebugger: Send + Sync {
    /// Called for every decoded inbound packet, before dispatch.
    fn inbound(&self, packet: &Packet);

    /// Called for every outbound packet after interception, before the
    /// transport write.
    fn outbound(&self, packet: &Packet);
}

/// Debugger that mirrors traffic into the tracing log.
pub struct TracingDebugger {
    identity: ConnectionIdentity,
}

impl TracingDebugger {
    pub fn new(identity: ConnectionIdentity) -> Self {
        Self { identity }
    }
}

impl PacketDebugger for TracingDebugger {
    fn inbound(&self, packet: &Packet) {
        debug!(
            target: "xmppc::traffic",
            identity = %self.identity,
            direction = "recv",
            id = packet.id(),
            kind = %packet.kind(),
            from = packet.from().unwrap_or(""),
            "stanza"
        );
    }

    fn outbound(&self, packet: &Packet) {
        debug!(
            target: "xmppc::traffic",
            identity = %self.identity,
            direction = "send",
            id = packet.id(),
            kind = %packet.kind(),
            to = packet.to().unwrap_or(""),
            "stanza"
        );
    }
}
