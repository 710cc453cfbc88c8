//! Packet filters: predicates deciding which observers see which packets.
//!
//! Registry entries hold an `Option<Arc<dyn PacketFilter>>`; `None` accepts
//! every packet. Filters must be pure: they run on the dispatch path for
//! every candidate packet.

use std::sync::Arc;

use super::{MessageType, Packet, StanzaKind};

/// Predicate over a packet.
pub trait PacketFilter: Send + Sync {
    fn accept(&self, packet: &Packet) -> bool;
}

impl<F> PacketFilter for F
where
    F: Fn(&Packet) -> bool + Send + Sync,
{
    fn accept(&self, packet: &Packet) -> bool {
        self(packet)
    }
}

/// Accepts packets with the given id.
pub struct IdFilter {
    id: String,
}

impl IdFilter {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl PacketFilter for IdFilter {
    fn accept(&self, packet: &Packet) -> bool {
        packet.id() == self.id
    }
}

/// Accepts packets of the given stanza kind.
pub struct KindFilter {
    kind: StanzaKind,
}

impl KindFilter {
    pub fn new(kind: StanzaKind) -> Self {
        Self { kind }
    }
}

impl PacketFilter for KindFilter {
    fn accept(&self, packet: &Packet) -> bool {
        packet.kind() == self.kind
    }
}

/// Accepts messages of the given sub-type.
pub struct MessageTypeFilter {
    message_type: MessageType,
}

impl MessageTypeFilter {
    pub fn new(message_type: MessageType) -> Self {
        Self { message_type }
    }
}

impl PacketFilter for MessageTypeFilter {
    fn accept(&self, packet: &Packet) -> bool {
        matches!(packet, Packet::Message(m) if m.message_type == self.message_type)
    }
}

/// Accepts packets whose `from` address contains the given fragment.
pub struct FromContains {
    fragment: String,
}

impl FromContains {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
        }
    }
}

impl PacketFilter for FromContains {
    fn accept(&self, packet: &Packet) -> bool {
        packet
            .from()
            .map(|from| from.contains(&self.fragment))
            .unwrap_or(false)
    }
}

/// Accepts packets accepted by every inner filter.
pub struct AllOf {
    filters: Vec<Arc<dyn PacketFilter>>,
}

impl AllOf {
    pub fn new(filters: Vec<Arc<dyn PacketFilter>>) -> Self {
        Self { filters }
    }
}

impl PacketFilter for AllOf {
    fn accept(&self, packet: &Packet) -> bool {
        self.filters.iter().all(|f| f.accept(packet))
    }
}

/// Accepts packets accepted by at least one inner filter.
pub struct AnyOf {
    filters: Vec<Arc<dyn PacketFilter>>,
}

impl AnyOf {
    pub fn new(filters: Vec<Arc<dyn PacketFilter>>) -> Self {
        Self { filters }
    }
}

impl PacketFilter for AnyOf {
    fn accept(&self, packet: &Packet) -> bool {
        self.filters.iter().any(|f| f.accept(packet))
    }
}

/// Inverts an inner filter.
pub struct Not {
    inner: Arc<dyn PacketFilter>,
}

impl Not {
    pub fn new(inner: Arc<dyn PacketFilter>) -> Self {
        Self { inner }
    }
}

impl PacketFilter for Not {
    fn accept(&self, packet: &Packet) -> bool {
        !self.inner.accept(packet)
    }
}
