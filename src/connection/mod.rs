//! Connection lifecycle, authentication, and reconnection.

mod auth;
#[allow(clippy::module_inception)]
mod connection;
mod creation;
mod reconnect;
mod state;

pub use connection::{Connection, ConnectionBuilder, ConnectionIdentity, CredentialProvider};
pub use creation::{
    creation_registry, ConnectionCreationObserver, CreationRegistry, ObserverHandle,
};
pub use state::{ConnectionState, ConnectionStatusListener, StatusHandle};
