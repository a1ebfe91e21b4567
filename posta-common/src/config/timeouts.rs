//! Read and write deadlines for both ends of an SMTP conversation.
//!
//! - **Server-side**: how long an intake session waits on its client.
//! - **Client-side**: how long the relay waits on the upstream server.
//!
//! Values are configured in whole seconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Common interface for timeout configuration.
pub trait TimeoutConfig {
    /// Deadline for a single command/reply exchange.
    fn command_timeout(&self) -> Duration;

    /// Deadline for message data.
    fn data_timeout(&self) -> Duration;
}

/// Deadlines applied to clients submitting mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTimeouts {
    /// How long to wait for the next command line.
    ///
    /// Default: 300 seconds (5 minutes, per RFC 5321)
    #[serde(default = "defaults::server_command_secs")]
    pub command_secs: u64,

    /// How long to wait for each line of message data.
    ///
    /// Default: 180 seconds (3 minutes, per RFC 5321)
    #[serde(default = "defaults::server_data_secs")]
    pub data_secs: u64,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            command_secs: defaults::server_command_secs(),
            data_secs: defaults::server_data_secs(),
        }
    }
}

impl TimeoutConfig for ServerTimeouts {
    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }
}

/// Deadlines applied when relaying to the upstream server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTimeouts {
    /// Timeout for establishing the TCP connection and reading the greeting.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::client_connect_secs")]
    pub connect_secs: u64,

    /// Timeout for EHLO, STARTTLS, AUTH, MAIL, RCPT and QUIT.
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::client_command_secs")]
    pub command_secs: u64,

    /// Timeout for DATA and the message transfer.
    ///
    /// Default: 120 seconds
    #[serde(default = "defaults::client_data_secs")]
    pub data_secs: u64,
}

impl ClientTimeouts {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: defaults::client_connect_secs(),
            command_secs: defaults::client_command_secs(),
            data_secs: defaults::client_data_secs(),
        }
    }
}

impl TimeoutConfig for ClientTimeouts {
    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }
}

mod defaults {
    pub const fn server_command_secs() -> u64 {
        300
    }
    pub const fn server_data_secs() -> u64 {
        180
    }

    pub const fn client_connect_secs() -> u64 {
        30
    }
    pub const fn client_command_secs() -> u64 {
        60
    }
    pub const fn client_data_secs() -> u64 {
        120
    }
}
