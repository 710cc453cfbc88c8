//! The dispatch hub: one place that owns every observer registry of a
//! connection and fans traffic out to them.
//!
//! Inbound dispatch runs on the connection's single reader task: collectors
//! are fed first, then receive listeners, in decode order. Outbound dispatch
//! runs on the sender's task: the interceptor chain before the transport
//! write, send listeners after a successful write.

use std::sync::Arc;

use crate::packet::{Packet, PacketFilter};
use crate::telemetry::EngineStats;

use super::collector::{CollectorSet, PacketCollector};
use super::interceptor::InterceptorChain;
use super::registry::ListenerRegistry;

pub(crate) struct DispatchHub {
    recv_listeners: ListenerRegistry,
    send_listeners: ListenerRegistry,
    interceptors: InterceptorChain,
    collectors: Arc<CollectorSet>,
    stats: Arc<EngineStats>,
}

impl DispatchHub {
    pub fn new(collector_capacity: usize, stats: Arc<EngineStats>) -> Self {
        Self {
            recv_listeners: ListenerRegistry::new("receive"),
            send_listeners: ListenerRegistry::new("send"),
            interceptors: InterceptorChain::new(),
            collectors: CollectorSet::new(collector_capacity),
            stats,
        }
    }

    /// Fan one decoded packet out to collectors and receive listeners.
    pub fn dispatch_inbound(&self, packet: &Packet) {
        self.stats.inc_received();
        self.collectors.offer_all(packet, &self.stats);
        self.recv_listeners.notify(packet, &self.stats);
    }

    /// Run the interceptor chain over a packet about to be written.
    pub fn run_interceptors(&self, packet: &mut Packet) {
        self.interceptors.run(packet, &self.stats);
    }

    /// Notify send listeners after a successful transport write.
    pub fn notify_sent(&self, packet: &Packet) {
        self.stats.inc_sent();
        self.send_listeners.notify(packet, &self.stats);
    }

    pub fn create_collector(&self, filter: Option<Arc<dyn PacketFilter>>) -> PacketCollector {
        self.collectors.create(filter)
    }

    pub fn recv_listeners(&self) -> &ListenerRegistry {
        &self.recv_listeners
    }

    pub fn send_listeners(&self) -> &ListenerRegistry {
        &self.send_listeners
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    /// Clear every stateful registry. Used by explicit disconnect; the
    /// abrupt-failure path never calls this.
    pub fn clear(&self) {
        self.recv_listeners.clear();
        self.send_listeners.clear();
        self.interceptors.clear();
        self.collectors.cancel_all();
    }

    #[cfg(test)]
    pub fn active_collectors(&self) -> usize {
        self.collectors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::packet::{IdFilter, Message};
    use std::sync::Mutex;

    fn chat_with_id(id: &str) -> Packet {
        let mut message = Message::chat("a@example.org", "hi");
        message.id = id.to_string();
        Packet::Message(message)
    }

    #[tokio::test]
    async fn test_inbound_feeds_collectors_and_listeners() {
        let stats = Arc::new(EngineStats::default());
        let hub = DispatchHub::new(16, Arc::clone(&stats));

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_by_listener = Arc::clone(&seen);
        hub.recv_listeners().add(
            Arc::new(move |packet: &Packet| -> Result<(), BoxError> {
                seen_by_listener.lock().unwrap().push(packet.id().to_string());
                Ok(())
            }),
            None,
        );
        let collector = hub.create_collector(Some(Arc::new(IdFilter::new("two"))));

        hub.dispatch_inbound(&chat_with_id("one"));
        hub.dispatch_inbound(&chat_with_id("two"));

        assert_eq!(seen.lock().unwrap().as_slice(), ["one", "two"]);
        assert_eq!(collector.poll_result().map(|p| p.id().to_string()), Some("two".into()));
        assert_eq!(stats.packets_received(), 2);
    }

    #[tokio::test]
    async fn test_clear_cancels_collectors() {
        let hub = DispatchHub::new(16, Arc::new(EngineStats::default()));
        let collector = hub.create_collector(None);
        hub.recv_listeners().add(
            Arc::new(|_: &Packet| -> Result<(), BoxError> { Ok(()) }),
            None,
        );

        hub.clear();

        assert!(collector.is_cancelled());
        assert_eq!(hub.active_collectors(), 0);
        assert_eq!(hub.recv_listeners().len(), 0);
    }
}
