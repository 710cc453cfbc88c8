//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use xmppc::config::ConnectionConfig;
use xmppc::error::BoxError;
use xmppc::packet::Packet;
use xmppc::transport::{MockConnector, MockServerConfig};
use xmppc::{Connection, ConnectionStatusListener, Error, PacketListener, TransportError};

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Connection wired to a fresh mock server.
pub fn connection_with_mock(
    config: ConnectionConfig,
    server: MockServerConfig,
) -> (Arc<Connection>, Arc<MockConnector>) {
    let connector = MockConnector::with_config(server);
    let connection = Connection::builder(config)
        .connector(connector.clone())
        .build();
    (connection, connector)
}

pub fn default_connection() -> (Arc<Connection>, Arc<MockConnector>) {
    connection_with_mock(
        ConnectionConfig::new("mock.example.org"),
        MockServerConfig::default(),
    )
}

/// Packet listener that records everything it sees.
pub struct Recorder {
    packets: Mutex<Vec<Packet>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            packets: Mutex::new(Vec::new()),
        })
    }

    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.packets.lock().unwrap().len()
    }
}

impl PacketListener for Recorder {
    fn process_packet(&self, packet: &Packet) -> Result<(), BoxError> {
        self.packets.lock().unwrap().push(packet.clone());
        Ok(())
    }
}

/// Status listener that records event tags in arrival order.
pub struct StatusRecorder {
    events: Mutex<Vec<String>>,
}

impl StatusRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn has(&self, tag: &str) -> bool {
        self.events.lock().unwrap().iter().any(|e| e == tag)
    }
}

impl ConnectionStatusListener for StatusRecorder {
    fn connection_closed(&self) {
        self.events.lock().unwrap().push("closed".to_string());
    }

    fn connection_closed_on_error(&self, _error: &TransportError) {
        self.events
            .lock()
            .unwrap()
            .push("closed-on-error".to_string());
    }

    fn reconnecting_in(&self, _delay: Duration) {
        self.events.lock().unwrap().push("reconnecting".to_string());
    }

    fn reconnection_succeeded(&self) {
        self.events.lock().unwrap().push("reconnected".to_string());
    }

    fn reconnection_failed(&self, error: &Error) {
        assert!(matches!(error, Error::ReconnectionExhausted { .. }));
        self.events.lock().unwrap().push("gave-up".to_string());
    }
}
