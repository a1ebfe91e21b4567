//! Typed errors for delivery attempts.
//!
//! Failures are split the way an upstream server reports them: permanent
//! (5xx replies, bad configuration) and temporary (4xx replies, network
//! trouble, timeouts). Nothing is retried yet, but the split decides the log
//! level a worker reports at.

use std::time::Duration;

use posta_smtp::client::{ClientError, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The upstream server refused with a 5xx reply.
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// The upstream server deferred with a 4xx reply.
    #[error("Temporary failure: {0}")]
    Temporary(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("{step} timed out after {after:?}")]
    Timeout { step: &'static str, after: Duration },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl DeliveryError {
    /// Classify an unexpected upstream reply to `step`.
    #[must_use]
    pub fn rejected(step: &str, response: &Response) -> Self {
        let message = format!("{step} rejected: {response}");

        if response.is_temporary_error() {
            Self::Temporary(message)
        } else {
            Self::Permanent(message)
        }
    }

    /// Whether another attempt could never succeed.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_) | Self::Configuration(_))
    }

    /// Whether the failure may clear up on its own.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        !self.is_permanent()
    }
}
