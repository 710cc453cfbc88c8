//! Async XMPP client connection engine.
//!
//! The heart of this crate is the packet-dispatch engine: one bidirectional
//! stanza stream multiplexed onto blocking collectors, asynchronous
//! listeners, and synchronous interceptors, with lifecycle management,
//! authentication coordination, and abrupt-disconnect recovery on top.
//!
//! ```no_run
//! use xmppc::config::ConnectionConfig;
//! use xmppc::packet::{Message, Packet};
//! use xmppc::Connection;
//!
//! # async fn run() -> Result<(), xmppc::Error> {
//! let connection = Connection::new(ConnectionConfig::new("xmpp.example.org"));
//! connection.connect().await?;
//! connection.login("alice", "secret", "phone").await?;
//!
//! connection
//!     .send_packet(Packet::Message(Message::chat("bob@example.org", "hi")))
//!     .await?;
//!
//! connection.disconnect().await;
//! # Ok(())
//! # }
//! ```
//!
//! The wire grammar, TLS, and SASL mechanism internals live behind the
//! [`transport::Connector`] seam; the engine only coordinates.

pub mod config;
pub mod connection;
pub mod debugger;
pub mod dispatch;
pub mod error;
pub mod packet;
pub mod telemetry;
pub mod transport;

pub use connection::{
    creation_registry, Connection, ConnectionBuilder, ConnectionCreationObserver,
    ConnectionIdentity, ConnectionState, ConnectionStatusListener, CredentialProvider,
};
pub use dispatch::{
    InterceptorHandle, ListenerHandle, PacketCollector, PacketInterceptor, PacketListener,
};
pub use error::{AuthError, Error, TransportError};
pub use packet::{Packet, PacketFilter};
