//! Error taxonomy for the connection engine.

use thiserror::Error;

/// Boxed error returned by packet listeners and interceptors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Transport-level failures: the socket or stream is gone or unusable.
///
/// While the connection is online these trigger the abrupt-disconnect path
/// and, if allowed by configuration, automatic reconnection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("frame too large: {size} bytes (limit {limit})")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("connect to {address} failed: {reason}")]
    ConnectFailed { address: String, reason: String },

    #[error("transport closed")]
    Closed,
}

/// Authentication failures. Terminal for the login attempt, not for the
/// connection: the transport stays connected and login may be retried.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication rejected: {condition}")]
    Rejected { condition: String },

    #[error("timeout waiting for {step} reply")]
    StepTimeout { step: &'static str },

    #[error("malformed {step} reply")]
    MalformedReply { step: &'static str },
}

/// Top-level error type of the engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("invalid state for operation: {0}")]
    IllegalState(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Reconnection policy ran out of attempts. Delivered to connection
    /// status observers, never returned from a pending call.
    #[error("reconnection abandoned after {attempts} attempts")]
    ReconnectionExhausted { attempts: u32 },
}

impl Error {
    /// Check whether this is a lifecycle-state usage error.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Error::IllegalState(_))
    }
}
