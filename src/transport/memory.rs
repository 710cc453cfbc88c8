//! In-memory transport and scriptable peer for tests.
//!
//! [`MockConnector`] hands out channel-backed transports wired to a spawned
//! mock server task that answers the auth/bind/roster handshake. Tests can
//! inject server-to-client packets, inspect what the server received, sever
//! the session to simulate abrupt transport loss, or make upcoming connect
//! attempts fail to exercise reconnection backoff.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::config::ConnectionConfig;
use crate::error::TransportError;
use crate::packet::{Iq, IqPayload, IqType, Packet, RosterItem};

use super::{Connector, PacketReader, PacketWriter, Transport, TransportInfo};

const CHANNEL_CAPACITY: usize = 64;

/// Behavior of the mock server side.
#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// Credentials accepted by the handshake. `None` accepts any pair.
    pub accept: Option<(String, String)>,
    /// Whether anonymous logins succeed.
    pub allow_anonymous: bool,
    /// Roster returned to roster queries.
    pub roster: Vec<RosterItem>,
    /// Simulated processing latency per request.
    pub latency: Duration,
    /// Swallow every request without replying (for timeout tests).
    pub silent: bool,
    /// Capabilities reported in [`TransportInfo`].
    pub secure: bool,
    pub compressed: bool,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            accept: None,
            allow_anonymous: true,
            roster: Vec::new(),
            latency: Duration::ZERO,
            silent: false,
            secure: false,
            compressed: false,
        }
    }
}

/// Connector producing in-memory transports served by a mock peer.
pub struct MockConnector {
    config: MockServerConfig,
    connects: AtomicU64,
    fail_next: AtomicU32,
    anon_counter: Arc<AtomicU64>,
    received: Arc<Mutex<Vec<Packet>>>,
    session: Mutex<Option<SessionHandle>>,
}

struct SessionHandle {
    to_client: mpsc::Sender<Packet>,
    shutdown: watch::Sender<bool>,
}

impl MockConnector {
    /// Mock accepting any credentials.
    pub fn new() -> Arc<Self> {
        Self::with_config(MockServerConfig::default())
    }

    pub fn with_config(config: MockServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            connects: AtomicU64::new(0),
            fail_next: AtomicU32::new(0),
            anon_counter: Arc::new(AtomicU64::new(1)),
            received: Arc::new(Mutex::new(Vec::new())),
            session: Mutex::new(None),
        })
    }

    /// How many connect attempts were made (successful or not).
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Push a packet toward the client, as if the server had sent it.
    pub async fn inject(&self, packet: Packet) -> bool {
        let sender = self
            .session
            .lock()
            .unwrap()
            .as_ref()
            .map(|session| session.to_client.clone());
        match sender {
            Some(sender) => sender.send(packet).await.is_ok(),
            None => false,
        }
    }

    /// Sever the current session without any goodbye, simulating abrupt
    /// transport loss. No-op when no session is live.
    pub fn drop_connection(&self) {
        if let Some(session) = self.session.lock().unwrap().take() {
            debug!("mock server dropping connection");
            let _ = session.shutdown.send(true);
        }
    }

    /// Everything the server side has received, in arrival order.
    pub fn received(&self) -> Vec<Packet> {
        self.received.lock().unwrap().clone()
    }

    pub fn clear_received(&self) {
        self.received.lock().unwrap().clear();
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Transport, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let failures_left = self.fail_next.load(Ordering::SeqCst);
        if failures_left > 0 {
            self.fail_next.store(failures_left - 1, Ordering::SeqCst);
            return Err(TransportError::ConnectFailed {
                address: format!("{}:{}", config.host, config.port),
                reason: "mock connect failure".to_string(),
            });
        }

        let (to_server, from_client) = mpsc::channel(CHANNEL_CAPACITY);
        let (to_client, from_server) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state = ServeState {
            config: self.config.clone(),
            service: config.service_name().to_string(),
            received: Arc::clone(&self.received),
            anon_counter: Arc::clone(&self.anon_counter),
        };
        tokio::spawn(serve(from_client, to_client.clone(), shutdown_rx, state));

        // Replacing the previous handle drops its shutdown sender, which
        // terminates any still-running session task.
        *self.session.lock().unwrap() = Some(SessionHandle {
            to_client,
            shutdown: shutdown_tx,
        });

        Ok(Transport {
            reader: Box::new(MemoryReader {
                inner: from_server,
            }),
            writer: Box::new(MemoryWriter {
                inner: Some(to_server),
            }),
            info: TransportInfo {
                peer: format!("mock:{}", config.service_name()),
                secure: self.config.secure,
                compressed: self.config.compressed,
            },
        })
    }
}

struct MemoryReader {
    inner: mpsc::Receiver<Packet>,
}

#[async_trait]
impl PacketReader for MemoryReader {
    async fn read_packet(&mut self) -> Result<Option<Packet>, TransportError> {
        Ok(self.inner.recv().await)
    }
}

struct MemoryWriter {
    inner: Option<mpsc::Sender<Packet>>,
}

#[async_trait]
impl PacketWriter for MemoryWriter {
    async fn write_packet(&mut self, packet: &Packet) -> Result<(), TransportError> {
        match &self.inner {
            Some(sender) => sender
                .send(packet.clone())
                .await
                .map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner = None;
        Ok(())
    }
}

struct ServeState {
    config: MockServerConfig,
    service: String,
    received: Arc<Mutex<Vec<Packet>>>,
    anon_counter: Arc<AtomicU64>,
}

async fn serve(
    mut requests: mpsc::Receiver<Packet>,
    replies: mpsc::Sender<Packet>,
    mut shutdown: watch::Receiver<bool>,
    state: ServeState,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("mock server session ended");
                return;
            }
            request = requests.recv() => {
                let Some(packet) = request else {
                    debug!("mock server peer closed");
                    return;
                };

                trace!(id = packet.id(), "mock server received");
                state.received.lock().unwrap().push(packet.clone());

                if !state.config.latency.is_zero() {
                    sleep(state.config.latency).await;
                }
                if state.config.silent {
                    continue;
                }

                if let Some(reply) = respond(&packet, &state) {
                    if replies.send(reply).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

fn respond(packet: &Packet, state: &ServeState) -> Option<Packet> {
    let Packet::Iq(iq) = packet else {
        // Messages and presence are recorded but unanswered.
        return None;
    };

    let reply = match (&iq.iq_type, &iq.payload) {
        (IqType::Get, IqPayload::Auth { username, .. }) => Iq::result(
            iq.id.clone(),
            IqPayload::Auth {
                username: username.clone(),
                password: None,
                resource: None,
            },
        ),
        (IqType::Set, IqPayload::Auth { username, password, resource }) => {
            bind_reply(iq, username, password, resource, state)
        }
        (IqType::Get, IqPayload::Roster { .. }) => Iq::result(
            iq.id.clone(),
            IqPayload::Roster {
                items: state.config.roster.clone(),
            },
        ),
        (IqType::Get, IqPayload::Ping) => Iq::result(iq.id.clone(), IqPayload::Ping),
        (IqType::Result, _) | (IqType::Error, _) => return None,
        _ => Iq::error(iq.id.clone(), "feature-not-implemented"),
    };

    Some(Packet::Iq(reply))
}

fn bind_reply(
    iq: &Iq,
    username: &Option<String>,
    password: &Option<String>,
    resource: &Option<String>,
    state: &ServeState,
) -> Iq {
    let resource = resource.as_deref().unwrap_or("default");

    match username {
        None => {
            if !state.config.allow_anonymous {
                return Iq::error(iq.id.clone(), "not-authorized");
            }
            let n = state.anon_counter.fetch_add(1, Ordering::SeqCst);
            Iq::result(
                iq.id.clone(),
                IqPayload::Bound {
                    jid: format!("anon-{}@{}/{}", n, state.service, resource),
                },
            )
        }
        Some(username) => {
            if let Some((expected_user, expected_pass)) = &state.config.accept {
                let authorized = username == expected_user
                    && password.as_deref() == Some(expected_pass.as_str());
                if !authorized {
                    return Iq::error(iq.id.clone(), "not-authorized");
                }
            }
            Iq::result(
                iq.id.clone(),
                IqPayload::Bound {
                    jid: format!("{}@{}/{}", username, state.service, resource),
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ConnectionConfig {
        ConnectionConfig::new("mock.example.org")
    }

    #[tokio::test]
    async fn test_handshake_accepts_configured_credentials() {
        let connector = MockConnector::with_config(MockServerConfig {
            accept: Some(("alice".to_string(), "secret".to_string())),
            ..Default::default()
        });
        let mut transport = connector.connect(&test_config()).await.unwrap();

        let request = Iq::set(IqPayload::Auth {
            username: Some("alice".to_string()),
            password: Some("secret".to_string()),
            resource: Some("phone".to_string()),
        });
        transport
            .writer
            .write_packet(&Packet::Iq(request.clone()))
            .await
            .unwrap();

        let reply = transport.reader.read_packet().await.unwrap().unwrap();
        let Packet::Iq(reply) = reply else {
            panic!("expected iq reply");
        };
        assert_eq!(reply.id, request.id);
        assert_eq!(
            reply.payload,
            IqPayload::Bound {
                jid: "alice@mock.example.org/phone".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_handshake_rejects_bad_password() {
        let connector = MockConnector::with_config(MockServerConfig {
            accept: Some(("alice".to_string(), "secret".to_string())),
            ..Default::default()
        });
        let mut transport = connector.connect(&test_config()).await.unwrap();

        let request = Iq::set(IqPayload::Auth {
            username: Some("alice".to_string()),
            password: Some("wrong".to_string()),
            resource: None,
        });
        transport
            .writer
            .write_packet(&Packet::Iq(request))
            .await
            .unwrap();

        let Packet::Iq(reply) = transport.reader.read_packet().await.unwrap().unwrap() else {
            panic!("expected iq reply");
        };
        assert_eq!(reply.iq_type, IqType::Error);
    }

    #[tokio::test]
    async fn test_drop_connection_closes_reader() {
        let connector = MockConnector::new();
        let mut transport = connector.connect(&test_config()).await.unwrap();

        connector.drop_connection();
        assert_eq!(transport.reader.read_packet().await.unwrap(), None);
        assert!(!connector.inject(Packet::Presence(crate::packet::Presence::available())).await);
    }
}
