//! The `posta.config.ron` file.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use posta_common::config::ServerTimeouts;
use posta_delivery::{Deliver, DeliveryConfig, LogDelivery, PoolConfig, SmtpRelay};
use posta_smtp::SessionConfig;
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "POSTA_CONFIG";

/// Locations tried, in order, when nothing names a file explicitly.
pub const DEFAULT_PATHS: [&str; 2] = ["./posta.config.ron", "/etc/posta/posta.config.ron"];

mod defaults {
    use std::net::{Ipv4Addr, SocketAddr};

    pub const fn listen() -> SocketAddr {
        SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::UNSPECIFIED), 2525)
    }

    pub const fn queue_capacity() -> usize {
        posta_common::queue::DEFAULT_CAPACITY
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Posta {
    /// Address the SMTP listener binds to
    ///
    /// Default: `0.0.0.0:2525`
    #[serde(default = "defaults::listen")]
    pub listen: SocketAddr,

    /// Name announced in the greeting; `$HOSTNAME` (or `localhost`) when empty
    #[serde(default)]
    pub banner: String,

    /// Messages held between intake and delivery before clients wait
    ///
    /// Default: 100
    #[serde(default = "defaults::queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub timeouts: ServerTimeouts,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl Default for Posta {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            banner: String::new(),
            queue_capacity: defaults::queue_capacity(),
            timeouts: ServerTimeouts::default(),
            pool: PoolConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl Posta {
    /// Parse a configuration from RON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration.
    pub fn from_ron(content: &str) -> anyhow::Result<Self> {
        ron::from_str(content).context("Invalid configuration")
    }

    /// Read and parse the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::from_ron(&content).with_context(|| format!("In {}", path.display()))
    }

    /// Reject values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.queue_capacity > 0, "queue_capacity must be at least 1");
        anyhow::ensure!(
            self.timeouts.command_secs > 0 && self.timeouts.data_secs > 0,
            "timeouts must be at least 1 second"
        );
        self.pool.validate()?;

        if let DeliveryConfig::Relay(relay) = &self.delivery {
            anyhow::ensure!(!relay.host.trim().is_empty(), "relay host must not be empty");
            anyhow::ensure!(relay.port > 0, "relay port must not be 0");
            anyhow::ensure!(
                relay.timeouts.connect_secs > 0
                    && relay.timeouts.command_secs > 0
                    && relay.timeouts.data_secs > 0,
                "relay timeouts must be at least 1 second"
            );
        }

        Ok(())
    }

    pub(crate) fn session(&self) -> SessionConfig {
        SessionConfig::builder()
            .with_banner(self.banner.clone())
            .with_timeouts(self.timeouts.clone())
            .build()
    }

    /// Build the configured delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay cannot be set up, such as when its
    /// password variable is missing.
    pub fn delivery(&self) -> anyhow::Result<Arc<dyn Deliver>> {
        Ok(match &self.delivery {
            DeliveryConfig::Log => Arc::new(LogDelivery),
            DeliveryConfig::Relay(relay) => Arc::new(
                SmtpRelay::new(relay.clone()).context("Failed to configure relay delivery")?,
            ),
        })
    }
}

/// Find the configuration file.
///
/// `explicit` (from `--config`) wins, then `env` (the value of
/// [`CONFIG_ENV`]), then the first of `defaults` that exists. A file named
/// explicitly or through the environment must exist; returns `None` when no
/// default file is present.
///
/// # Errors
///
/// Returns an error if an explicitly named file does not exist.
pub fn find_config_file(
    explicit: Option<PathBuf>,
    env: Option<String>,
    defaults: &[PathBuf],
) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        anyhow::ensure!(path.exists(), "Config file {} does not exist", path.display());
        return Ok(Some(path));
    }

    if let Some(path) = env.map(PathBuf::from) {
        anyhow::ensure!(
            path.exists(),
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
        return Ok(Some(path));
    }

    Ok(defaults.iter().find(|path| path.exists()).cloned())
}
