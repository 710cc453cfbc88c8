//! The connection engine.
//!
//! A [`Connection`] turns one bidirectional packet stream into a multiplexed
//! set of observers: receive/send listeners, interceptors, and collectors.
//! A dedicated reader task decodes inbound traffic and performs inbound
//! dispatch; senders run outbound dispatch on their own task, serialized
//! through the writer mutex.
//!
//! Instances are reusable: an explicitly disconnected connection may connect
//! again, but behaves as freshly constructed for registration state. After
//! an abrupt transport loss all registries are preserved and, when allowed
//! by configuration, reconnection happens automatically.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::debugger::{PacketDebugger, TracingDebugger};
use crate::dispatch::{
    DispatchHub, InterceptorHandle, ListenerHandle, PacketCollector, PacketInterceptor,
    PacketListener,
};
use crate::error::{Error, TransportError};
use crate::packet::{Packet, PacketFilter, Presence};
use crate::telemetry::EngineStats;
use crate::transport::{Connector, PacketReader, PacketWriter, TcpConnector, Transport};

use super::auth::Handshake;
use super::creation::creation_registry;
use super::reconnect;
use super::state::{ConnectionState, ConnectionStatusListener, StatusHandle, StatusRegistry};

/// Counter assigning process-unique connection identities.
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a connection instance, assigned at
/// construction. Distinct from any server-issued session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionIdentity(u64);

impl ConnectionIdentity {
    fn next() -> Self {
        Self(CONNECTION_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    #[cfg(test)]
    pub(crate) fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Credential strategy for logins that do not pass an explicit password.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> (String, String);
}

/// Builder injecting the connection's strategies: transport connector,
/// debugger, credential provider.
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    connector: Option<Arc<dyn Connector>>,
    debugger: Option<Arc<dyn PacketDebugger>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl ConnectionBuilder {
    /// Transport strategy. Defaults to [`TcpConnector`].
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Explicit debugger strategy. Installing one implies debugging even if
    /// the config flag is off; with no explicit strategy the flag selects
    /// [`TracingDebugger`].
    pub fn debugger(mut self, debugger: Arc<dyn PacketDebugger>) -> Self {
        self.debugger = Some(debugger);
        self
    }

    pub fn credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    pub fn build(self) -> Arc<Connection> {
        let identity = ConnectionIdentity::next();
        let stats = Arc::new(EngineStats::default());

        let debugger = match self.debugger {
            Some(debugger) => Some(debugger),
            None if self.config.debugger_enabled => {
                Some(Arc::new(TracingDebugger::new(identity)) as Arc<dyn PacketDebugger>)
            }
            None => None,
        };

        let (state, _) = watch::channel(ConnectionState::Disconnected);

        let connection = Arc::new(Connection {
            identity,
            hub: DispatchHub::new(self.config.collector_capacity, Arc::clone(&stats)),
            config: self.config,
            connector: self
                .connector
                .unwrap_or_else(|| Arc::new(TcpConnector::new())),
            debugger,
            credentials: self.credentials,
            stats,
            state,
            status_listeners: StatusRegistry::new(),
            writer: tokio::sync::Mutex::new(None),
            reader_task: std::sync::Mutex::new(None),
            transport_info: std::sync::RwLock::new(None),
            user: std::sync::RwLock::new(None),
            anonymous: AtomicBool::new(false),
            reconnect_in_flight: AtomicBool::new(false),
            reconnect_suspended: AtomicBool::new(false),
        });

        creation_registry().notify(identity);
        debug!(identity = %identity, host = %connection.config.host, "connection created");

        connection
    }
}

/// An XMPP client connection: lifecycle state machine plus dispatch hub.
pub struct Connection {
    identity: ConnectionIdentity,
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    debugger: Option<Arc<dyn PacketDebugger>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    hub: DispatchHub,
    stats: Arc<EngineStats>,
    state: watch::Sender<ConnectionState>,
    status_listeners: StatusRegistry,
    writer: tokio::sync::Mutex<Option<Box<dyn PacketWriter>>>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    transport_info: std::sync::RwLock<Option<crate::transport::TransportInfo>>,
    user: std::sync::RwLock<Option<String>>,
    anonymous: AtomicBool,
    /// Single-flight guard for the reconnection task.
    pub(crate) reconnect_in_flight: AtomicBool,
    /// Set by explicit disconnect; re-armed by explicit connect.
    pub(crate) reconnect_suspended: AtomicBool,
}

impl Connection {
    /// Connection with default strategies (TCP transport).
    pub fn new(config: ConnectionConfig) -> Arc<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ConnectionConfig) -> ConnectionBuilder {
        ConnectionBuilder {
            config,
            connector: None,
            debugger: None,
            credentials: None,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Establish the transport. Calling while already connected is a usage
    /// error. Also re-arms automatic reconnection after a prior explicit
    /// disconnect.
    pub async fn connect(self: &Arc<Self>) -> Result<(), Error> {
        self.reconnect_suspended.store(false, Ordering::SeqCst);
        self.establish().await
    }

    /// Shared transport-establishment path for `connect` and reconnection.
    pub(crate) async fn establish(self: &Arc<Self>) -> Result<(), Error> {
        self.transition(ConnectionState::Disconnected, ConnectionState::Connecting)
            .map_err(|state| {
                Error::IllegalState(format!("connect() called while {}", state))
            })?;

        info!(
            identity = %self.identity,
            host = %self.config.host,
            port = self.config.port,
            "connecting"
        );

        let transport = match self.connector.connect(&self.config).await {
            Ok(transport) => transport,
            Err(error) => {
                self.state.send_replace(ConnectionState::Disconnected);
                warn!(identity = %self.identity, error = %error, "connect failed");
                return Err(Error::Transport(error));
            }
        };

        let Transport {
            reader,
            writer,
            info,
        } = transport;

        *self.transport_info.write().unwrap() = Some(info.clone());
        *self.writer.lock().await = Some(writer);

        let handle = tokio::spawn(Self::read_loop(Arc::clone(self), reader));
        if let Some(old) = self.reader_task.lock().unwrap().replace(handle) {
            old.abort();
        }

        if self
            .transition(ConnectionState::Connecting, ConnectionState::Connected)
            .is_err()
        {
            // Explicit disconnect raced the tail of the connect. Tear down
            // what we just installed.
            *self.writer.lock().await = None;
            *self.transport_info.write().unwrap() = None;
            if let Some(handle) = self.reader_task.lock().unwrap().take() {
                handle.abort();
            }
            return Err(Error::IllegalState("connection closed during connect".into()));
        }

        info!(
            identity = %self.identity,
            peer = %info.peer,
            secure = info.secure,
            compressed = info.compressed,
            "connected"
        );

        Ok(())
    }

    /// Log in with explicit credentials. Requires state `Connected`; on
    /// success the connection is `Authenticated`, on failure it stays
    /// `Connected` so login may be retried.
    pub async fn login(
        self: &Arc<Self>,
        username: &str,
        password: &str,
        resource: &str,
    ) -> Result<(), Error> {
        if username.is_empty() {
            return Err(Error::InvalidArgument("username is empty".into()));
        }

        self.begin_login()?;

        let handshake = Handshake::new(self);
        match handshake.login(username, password, resource).await {
            Ok(jid) => self.finish_login(jid, false).await,
            Err(error) => {
                self.abort_login();
                Err(error)
            }
        }
    }

    /// Log in using the configured credential provider.
    pub async fn login_with_provider(self: &Arc<Self>, resource: &str) -> Result<(), Error> {
        let provider = self
            .credentials
            .clone()
            .ok_or_else(|| Error::InvalidArgument("no credential provider configured".into()))?;
        let (username, password) = provider.credentials();
        self.login(&username, &password, resource).await
    }

    /// Log in anonymously; the server assigns the address.
    pub async fn login_anonymously(self: &Arc<Self>) -> Result<(), Error> {
        self.begin_login()?;

        let handshake = Handshake::new(self);
        match handshake.login_anonymously().await {
            Ok(jid) => self.finish_login(jid, true).await,
            Err(error) => {
                self.abort_login();
                Err(error)
            }
        }
    }

    /// Disconnect with the default unavailable presence.
    pub async fn disconnect(self: &Arc<Self>) {
        self.disconnect_with(Presence::unavailable()).await;
    }

    /// Send a final presence (best effort), close the transport, and clear
    /// every stateful registry. Always succeeds from the caller's view: its
    /// job is guaranteed local cleanup. Also stops any pending automatic
    /// reconnection.
    pub async fn disconnect_with(self: &Arc<Self>, presence: Presence) {
        self.reconnect_suspended.store(true, Ordering::SeqCst);

        let mut was_online = false;
        self.state.send_if_modified(|state| match *state {
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Authenticating
            | ConnectionState::Authenticated => {
                *state = ConnectionState::Closing;
                was_online = true;
                true
            }
            _ => false,
        });
        if !was_online {
            return;
        }

        debug!(identity = %self.identity, "disconnecting");

        {
            let mut guard = self.writer.lock().await;
            if let Some(writer) = guard.as_mut() {
                let packet = Packet::Presence(presence);
                if let Some(debugger) = &self.debugger {
                    debugger.outbound(&packet);
                }
                if let Err(error) = writer.write_packet(&packet).await {
                    debug!(identity = %self.identity, error = %error, "final presence not delivered");
                }
                if let Err(error) = writer.close().await {
                    debug!(identity = %self.identity, error = %error, "transport close failed");
                }
            }
            *guard = None;
        }

        if let Some(handle) = self.reader_task.lock().unwrap().take() {
            handle.abort();
        }

        self.hub.clear();
        *self.transport_info.write().unwrap() = None;
        *self.user.write().unwrap() = None;
        self.anonymous.store(false, Ordering::SeqCst);

        self.state.send_replace(ConnectionState::Disconnected);
        info!(identity = %self.identity, "disconnected");
        self.notify_status(|listener| listener.connection_closed());
    }

    // ------------------------------------------------------------------
    // Outbound path
    // ------------------------------------------------------------------

    /// Send a packet: interceptors, transport write, then send listeners.
    /// Fails fast with `IllegalState` when no transport is up.
    pub async fn send_packet(self: &Arc<Self>, mut packet: Packet) -> Result<(), Error> {
        let state = self.state();
        if !state.can_send() {
            return Err(Error::IllegalState(format!("cannot send while {}", state)));
        }

        self.hub.run_interceptors(&mut packet);

        let write_result = {
            let mut guard = self.writer.lock().await;
            match guard.as_mut() {
                Some(writer) => {
                    if let Some(debugger) = &self.debugger {
                        debugger.outbound(&packet);
                    }
                    writer.write_packet(&packet).await
                }
                None => {
                    return Err(Error::IllegalState("transport not established".into()));
                }
            }
        };

        if let Err(error) = write_result {
            self.handle_abrupt(&error).await;
            return Err(Error::Transport(error));
        }

        self.hub.notify_sent(&packet);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Observer registration
    // ------------------------------------------------------------------

    /// Create a collector accumulating inbound packets matching `filter`.
    /// The engine keeps a strong reference until the collector is
    /// cancelled; failing to cancel leaks the queue.
    pub fn create_packet_collector(
        &self,
        filter: Option<Arc<dyn PacketFilter>>,
    ) -> Result<PacketCollector, Error> {
        let state = self.state();
        if matches!(
            state,
            ConnectionState::Disconnected | ConnectionState::Closing
        ) {
            return Err(Error::IllegalState(format!(
                "cannot create collector while {}",
                state
            )));
        }
        Ok(self.hub.create_collector(filter))
    }

    /// Register a receive listener. Permitted in any state so observers can
    /// be attached before `connect()`.
    pub fn add_receive_listener(
        &self,
        listener: Arc<dyn PacketListener>,
        filter: Option<Arc<dyn PacketFilter>>,
    ) -> ListenerHandle {
        self.hub.recv_listeners().add(listener, filter)
    }

    /// Re-register at an existing handle, replacing listener and filter.
    pub fn replace_receive_listener(
        &self,
        handle: ListenerHandle,
        listener: Arc<dyn PacketListener>,
        filter: Option<Arc<dyn PacketFilter>>,
    ) -> Result<(), Error> {
        if self.hub.recv_listeners().replace(handle, listener, filter) {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "unknown receive listener handle {}",
                handle
            )))
        }
    }

    /// No-op when the handle is absent.
    pub fn remove_receive_listener(&self, handle: ListenerHandle) {
        self.hub.recv_listeners().remove(handle);
    }

    /// Register a send listener, notified after each successful write.
    pub fn add_send_listener(
        &self,
        listener: Arc<dyn PacketListener>,
        filter: Option<Arc<dyn PacketFilter>>,
    ) -> ListenerHandle {
        self.hub.send_listeners().add(listener, filter)
    }

    pub fn replace_send_listener(
        &self,
        handle: ListenerHandle,
        listener: Arc<dyn PacketListener>,
        filter: Option<Arc<dyn PacketFilter>>,
    ) -> Result<(), Error> {
        if self.hub.send_listeners().replace(handle, listener, filter) {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "unknown send listener handle {}",
                handle
            )))
        }
    }

    pub fn remove_send_listener(&self, handle: ListenerHandle) {
        self.hub.send_listeners().remove(handle);
    }

    /// Register an interceptor at the end of the chain.
    pub fn add_interceptor(
        &self,
        interceptor: Arc<dyn PacketInterceptor>,
        filter: Option<Arc<dyn PacketFilter>>,
    ) -> InterceptorHandle {
        self.hub.interceptors().add(interceptor, filter)
    }

    /// Re-register at an existing handle, keeping its chain position.
    pub fn replace_interceptor(
        &self,
        handle: InterceptorHandle,
        interceptor: Arc<dyn PacketInterceptor>,
        filter: Option<Arc<dyn PacketFilter>>,
    ) -> Result<(), Error> {
        if self.hub.interceptors().replace(handle, interceptor, filter) {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "unknown interceptor handle {}",
                handle
            )))
        }
    }

    pub fn remove_interceptor(&self, handle: InterceptorHandle) {
        self.hub.interceptors().remove(handle);
    }

    /// Register a connection-status listener. These survive explicit
    /// disconnect.
    pub fn add_status_listener(&self, listener: Arc<dyn ConnectionStatusListener>) -> StatusHandle {
        self.status_listeners.add(listener)
    }

    pub fn remove_status_listener(&self, handle: StatusHandle) {
        self.status_listeners.remove(handle);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn identity(&self) -> ConnectionIdentity {
        self.identity
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions. Receivers observe the latest state.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The full address assigned at login, if authenticated.
    pub fn user(&self) -> Option<String> {
        self.user.read().unwrap().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_online()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == ConnectionState::Authenticated
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous.load(Ordering::SeqCst)
    }

    pub fn is_secure(&self) -> bool {
        self.transport_info
            .read()
            .unwrap()
            .as_ref()
            .map(|info| info.secure)
            .unwrap_or(false)
    }

    pub fn is_using_compression(&self) -> bool {
        self.transport_info
            .read()
            .unwrap()
            .as_ref()
            .map(|info| info.compressed)
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Compare-and-set state transition. Returns the observed state on
    /// failure.
    fn transition(
        &self,
        expected: ConnectionState,
        next: ConnectionState,
    ) -> Result<(), ConnectionState> {
        let mut observed = expected;
        self.state.send_if_modified(|state| {
            if *state == expected {
                *state = next;
                true
            } else {
                observed = *state;
                false
            }
        });
        if observed == expected {
            Ok(())
        } else {
            Err(observed)
        }
    }

    fn begin_login(&self) -> Result<(), Error> {
        self.transition(ConnectionState::Connected, ConnectionState::Authenticating)
            .map_err(|state| match state {
                ConnectionState::Authenticated => {
                    Error::IllegalState("already logged in".into())
                }
                other => Error::IllegalState(format!("login requires CONNECTED, state is {}", other)),
            })
    }

    fn abort_login(&self) {
        // Leaves the transport connected so login may be retried. If the
        // transport dropped mid-handshake the state is already past
        // Authenticating and stays untouched.
        let _ = self.transition(ConnectionState::Authenticating, ConnectionState::Connected);
    }

    async fn finish_login(self: &Arc<Self>, jid: String, anonymous: bool) -> Result<(), Error> {
        *self.user.write().unwrap() = Some(jid.clone());
        self.anonymous.store(anonymous, Ordering::SeqCst);

        if self
            .transition(ConnectionState::Authenticating, ConnectionState::Authenticated)
            .is_err()
        {
            return Err(Error::IllegalState("connection lost during login".into()));
        }

        info!(identity = %self.identity, user = %jid, anonymous, "authenticated");

        if self.config.roster_loaded_at_login && !anonymous {
            Handshake::new(self).load_roster().await;
        }
        if self.config.send_presence_on_login {
            if let Err(error) = self.send_packet(Packet::Presence(Presence::available())).await {
                warn!(identity = %self.identity, error = %error, "initial presence failed");
            }
        }

        Ok(())
    }

    /// Abrupt transport failure: preserve registries, notify status
    /// observers, hand control to the reconnection manager when allowed.
    async fn handle_abrupt(self: &Arc<Self>, error: &TransportError) {
        let mut was_online = false;
        self.state.send_if_modified(|state| match *state {
            ConnectionState::Connected
            | ConnectionState::Authenticating
            | ConnectionState::Authenticated => {
                *state = ConnectionState::Disconnected;
                was_online = true;
                true
            }
            _ => false,
        });
        if !was_online {
            return;
        }

        self.stats.inc_abrupt_disconnect();
        error!(identity = %self.identity, error = %error, "connection dropped");

        *self.writer.lock().await = None;
        *self.transport_info.write().unwrap() = None;

        self.notify_status(|listener| listener.connection_closed_on_error(error));

        if self.config.reconnection_allowed && !self.reconnect_suspended.load(Ordering::SeqCst) {
            reconnect::spawn(Arc::clone(self));
        }
    }

    pub(crate) fn notify_status(&self, f: impl Fn(&dyn ConnectionStatusListener)) {
        self.status_listeners.each(f);
    }

    /// The dedicated reader task: decode, debug, dispatch, until the
    /// transport fails or the lifecycle leaves the online states.
    async fn read_loop(connection: Arc<Connection>, mut reader: Box<dyn PacketReader>) {
        let mut state_rx = connection.state.subscribe();

        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let state = *state_rx.borrow_and_update();
                    if matches!(state, ConnectionState::Closing | ConnectionState::Disconnected) {
                        debug!(identity = %connection.identity, "reader stopping");
                        return;
                    }
                }
                result = reader.read_packet() => {
                    match result {
                        Ok(Some(packet)) => {
                            if let Some(debugger) = &connection.debugger {
                                debugger.inbound(&packet);
                            }
                            connection.hub.dispatch_inbound(&packet);
                        }
                        Ok(None) => {
                            // Peer closed the stream without a goodbye.
                            connection.handle_abrupt(&TransportError::Closed).await;
                            return;
                        }
                        Err(error) => {
                            connection.handle_abrupt(&error).await;
                            return;
                        }
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity)
            .field("host", &self.config.host)
            .field("state", &self.state())
            .finish()
    }
}
