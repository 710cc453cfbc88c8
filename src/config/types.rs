use serde::Deserialize;
use std::time::Duration;

use crate::telemetry::TracingConfig;

/// Root configuration for the xmppc binary
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionConfig,

    /// Optional login performed after connect
    #[serde(default)]
    pub login: Option<LoginConfig>,

    /// Logging settings
    #[serde(default)]
    pub telemetry: TracingConfig,
}

/// Login performed by the binary after connecting
#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    /// Log in anonymously instead of with credentials
    #[serde(default)]
    pub anonymous: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_resource")]
    pub resource: String,
}

/// Immutable snapshot consumed when a connection is constructed.
///
/// Everything the lifecycle needs is captured here; the struct is never
/// mutated after `Connection::new`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Server host name or address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Service (domain) name; defaults to the host when omitted
    #[serde(default)]
    pub service_name: Option<String>,

    /// Reconnect automatically after abrupt transport loss
    #[serde(default = "default_true")]
    pub reconnection_allowed: bool,

    /// Mirror traffic into the log via the debugger strategy
    #[serde(default)]
    pub debugger_enabled: bool,

    /// Ask the connector to negotiate stream compression
    #[serde(default)]
    pub compression_preferred: bool,

    /// Send an initial available presence after login
    #[serde(default = "default_true")]
    pub send_presence_on_login: bool,

    /// Load the roster as part of login
    #[serde(default = "default_true")]
    pub roster_loaded_at_login: bool,

    /// Per-step reply timeout for handshakes and roster load
    #[serde(default = "default_reply_timeout", with = "humantime_serde")]
    pub reply_timeout: Duration,

    /// Per-collector queue bound (drop-oldest on overflow)
    #[serde(default = "default_collector_capacity")]
    pub collector_capacity: usize,

    /// Reconnection backoff policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl ConnectionConfig {
    /// Config with defaults for every field except the host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            service_name: None,
            reconnection_allowed: default_true(),
            debugger_enabled: false,
            compression_preferred: false,
            send_presence_on_login: default_true(),
            roster_loaded_at_login: default_true(),
            reply_timeout: default_reply_timeout(),
            collector_capacity: default_collector_capacity(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// The service (domain) name, falling back to the host.
    pub fn service_name(&self) -> &str {
        self.service_name.as_deref().unwrap_or(&self.host)
    }
}

/// Reconnection backoff policy
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// First retry delay; doubles per attempt
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    /// Delay cap
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Give up after this many attempts; unlimited when unset
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            max_attempts: None,
        }
    }
}

fn default_port() -> u16 {
    5222
}

fn default_true() -> bool {
    true
}

fn default_resource() -> String {
    "default".to_string()
}

fn default_reply_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_collector_capacity() -> usize {
    1024
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}
