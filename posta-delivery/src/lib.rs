//! Delivery side of posta: the worker pool that drains the queue and the
//! [`Deliver`] implementations it hands messages to.

pub mod error;
pub mod log;
pub mod pool;
pub mod relay;
pub mod render;

use async_trait::async_trait;
use posta_common::message::Message;
use serde::Deserialize;

pub use error::DeliveryError;
pub use log::LogDelivery;
pub use pool::{PoolConfig, WorkerPool};
pub use relay::{Credentials, RelayConfig, SmtpRelay};

/// Sends one message onward.
///
/// Implementations are shared by every worker, so they must be usable
/// concurrently.
#[async_trait]
pub trait Deliver: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] if the message could not be handed off.
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// Where queued messages go.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub enum DeliveryConfig {
    /// Log each message and drop it.
    #[default]
    Log,
    /// Relay each message to an upstream SMTP server.
    Relay(RelayConfig),
}
