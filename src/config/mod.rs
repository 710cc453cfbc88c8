//! Configuration types and YAML loading.

mod loader;
mod types;

pub use types::{Config, ConnectionConfig, LoginConfig, ReconnectConfig};
