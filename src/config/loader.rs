use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::types::{Config, ConnectionConfig};

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;

        if let Some(login) = &self.login {
            if !login.anonymous && (login.username.is_none() || login.password.is_none()) {
                anyhow::bail!("login requires username and password unless anonymous");
            }
        }

        info!("configuration validated successfully");
        Ok(())
    }
}

impl ConnectionConfig {
    /// Validate connection settings
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            anyhow::bail!("connection host must not be empty");
        }

        if self.port == 0 {
            anyhow::bail!("connection port must not be zero");
        }

        if self.collector_capacity == 0 {
            anyhow::bail!("collector_capacity must be at least 1");
        }

        if self.reply_timeout.is_zero() {
            anyhow::bail!("reply_timeout must be non-zero");
        }

        if self.reconnect.base_delay > self.reconnect.max_delay {
            anyhow::bail!(
                "reconnect base_delay ({:?}) exceeds max_delay ({:?})",
                self.reconnect.base_delay,
                self.reconnect.max_delay
            );
        }

        Ok(())
    }
}
