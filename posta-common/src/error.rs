//! Error types shared by the intake and delivery crates.

use std::io;

use thiserror::Error;

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connection error occurred.
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// The client went away, or stalled, while sending message data.
    #[error("Message data aborted: {0}")]
    DataAborted(String),

    /// Shutdown signal received.
    #[error("Shutdown requested")]
    Shutdown,

    /// Session timed out waiting for the client.
    #[error("Session timed out after {0} seconds")]
    Timeout(u64),
}

impl SessionError {
    /// Returns `true` if the error indicates a graceful shutdown.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    /// Returns `true` if the client caused the session to end.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::DataAborted(_) | Self::Timeout(_))
    }
}

/// Errors that can occur in the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to socket address.
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to query the bound socket.
    #[error("Failed to read local address: {0}")]
    LocalAddr(#[source] io::Error),
}

/// Errors raised while assembling a [`crate::message::Message`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// A message must be addressed to someone.
    #[error("Message has no recipients")]
    NoRecipients,
}

/// Errors raised by the message queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Every consumer has gone away, so nothing would ever drain the queue.
    #[error("Queue is closed")]
    Closed,
}
