use std::{net::SocketAddr, sync::Arc};

use posta_common::{
    Signal,
    config::{ServerTimeouts, TimeoutConfig},
    error::SessionError,
    incoming, internal, outgoing,
    queue::QueueProducer,
    status::Status,
    tracing,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::broadcast,
};

use crate::{State, command::Command, connection::Connection};

mod data;

pub use data::MessageData;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub banner: Arc<str>,
    pub timeouts: ServerTimeouts,
}

impl SessionConfig {
    /// Create a new `SessionConfig` builder
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for `SessionConfig`
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    banner: String,
    timeouts: ServerTimeouts,
}

impl SessionConfigBuilder {
    /// Set the name announced in the greeting
    #[must_use]
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    /// Set the timeout configuration for this session
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: ServerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Build the final `SessionConfig`, falling back to `$HOSTNAME` (or
    /// `localhost`) when no banner was given
    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            banner: if self.banner.is_empty() {
                std::env::var("HOSTNAME")
                    .unwrap_or_else(|_| "localhost".to_string())
                    .into()
            } else {
                self.banner.into()
            },
            timeouts: self.timeouts,
        }
    }
}

/// One client connection, from greeting to close.
pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    peer: SocketAddr,
    state: State,
    connection: Connection<Stream>,
    queue: QueueProducer,
    banner: Arc<str>,
    timeouts: ServerTimeouts,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub fn create(
        stream: Stream,
        peer: SocketAddr,
        queue: QueueProducer,
        config: &SessionConfig,
    ) -> Self {
        Self {
            peer,
            state: State::default(),
            connection: Connection::new(stream),
            queue,
            banner: Arc::clone(&config.banner),
            timeouts: config.timeouts.clone(),
        }
    }

    /// Drive the session until the client quits, disconnects, stalls, or
    /// `shutdown` fires while the session is waiting for a command.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] describing why the session ended, unless the
    /// client closed it with QUIT or by hanging up between commands.
    #[tracing::instrument(level = "trace", skip_all, fields(peer = %self.peer))]
    pub async fn run(
        mut self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), SessionError> {
        internal!("Connected");

        let greeting = format!("{} Service ready", self.banner);
        self.reply(Status::ServiceReady, &greeting).await?;

        let result = self.serve(&mut shutdown).await;

        internal!("Connection closed");
        result
    }

    async fn serve(
        &mut self,
        shutdown: &mut broadcast::Receiver<Signal>,
    ) -> Result<(), SessionError> {
        while !self.state.should_close() {
            let Some(line) = self.next_line(shutdown).await? else {
                return Ok(());
            };

            incoming!("{line}");

            let command = match Command::try_from(line.as_str()) {
                Ok(command) => command,
                Err(err) => {
                    self.reply(err.status(), &err.to_string()).await?;
                    continue;
                }
            };

            let (state, (status, text)) = std::mem::take(&mut self.state).transition(command);
            self.state = state;
            tracing::debug!("Transitioned to {}", self.state);

            self.reply(status, &text).await?;

            if matches!(self.state, State::ReadingData { .. }) {
                self.receive_message().await?;
            }
        }

        Ok(())
    }

    /// Wait for the next command line, giving up on shutdown or timeout.
    async fn next_line(
        &mut self,
        shutdown: &mut broadcast::Receiver<Signal>,
    ) -> Result<Option<String>, SessionError> {
        let timeout = self.timeouts.command_timeout();

        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                if self.state.in_transaction() {
                    internal!(level = INFO, "Abandoning open transaction for shutdown");
                }
                self.state = State::Closed;
                let text = format!("{} Service shutting down", self.banner);
                self.reply(Status::Unavailable, &text).await?;
                Err(SessionError::Shutdown)
            }

            line = tokio::time::timeout(timeout, self.connection.receive_line()) => {
                if let Ok(line) = line {
                    Ok(line?)
                } else {
                    tracing::warn!(
                        peer = %self.peer,
                        state = %self.state,
                        timeout_secs = self.timeouts.command_secs,
                        in_transaction = self.state.in_transaction(),
                        "Client connection timed out"
                    );
                    self.state = State::Closed;
                    let text = format!("{} Timeout waiting for command", self.banner);
                    let _ = self.reply(Status::Unavailable, &text).await;
                    Err(SessionError::Timeout(self.timeouts.command_secs))
                }
            }
        }
    }

    /// Read the DATA block and queue the resulting message.
    async fn receive_message(&mut self) -> Result<(), SessionError> {
        let timeout = self.timeouts.data_timeout();
        let mut data = MessageData::default();

        loop {
            let line = match tokio::time::timeout(timeout, self.connection.receive_line()).await {
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => return self.abort_data("unexpected end of stream").await,
                Ok(Err(err)) => return self.abort_data(&err.to_string()).await,
                Err(_) => return self.abort_data("timed out waiting for message data").await,
            };

            if data.push(line) {
                break;
            }
        }

        let Some((sender, recipients)) = self.state.take_envelope() else {
            return self.abort_data("no envelope for message data").await;
        };

        let message = match data.into_message(sender, recipients) {
            Ok(message) => message,
            Err(err) => return self.abort_data(&err.to_string()).await,
        };
        let id = message.id();

        internal!(
            level = DEBUG,
            "Queueing {id} ({} waiting of {})",
            self.queue.len(),
            self.queue.capacity()
        );

        match self.queue.push(message).await {
            Ok(()) => {
                internal!(level = INFO, "Accepted {id} from {}", self.peer);
                self.reply(Status::Ok, &format!("Ok: queued as {id}")).await
            }
            Err(err) => {
                internal!(level = ERROR, "Unable to queue {id}: {err}");
                self.reply(
                    Status::ActionAborted,
                    "Requested action aborted: local error in processing",
                )
                .await
            }
        }
    }

    /// Drop a partially received message and end the session.
    async fn abort_data(&mut self, reason: &str) -> Result<(), SessionError> {
        tracing::warn!(peer = %self.peer, reason, "Discarding partial message");

        self.state = State::Closed;
        let _ = self
            .reply(
                Status::ActionAborted,
                "Requested action aborted: error reading message data",
            )
            .await;

        Err(SessionError::DataAborted(reason.to_string()))
    }

    async fn reply(&mut self, status: Status, text: &str) -> Result<(), SessionError> {
        outgoing!("{status} {text}");

        self.connection.send(status, text).await.map_err(|err| {
            internal!(level = ERROR, "Failed to send response: {err}");
            SessionError::from(err)
        })
    }
}
