use std::{net::SocketAddr, time::Duration};

use futures_util::future::join_all;
use posta_common::{Signal, error::ListenerError, internal, queue::QueueProducer, tracing};
use tokio::{net::TcpListener, sync::broadcast};

use crate::session::{Session, SessionConfig};

/// Accepts SMTP clients and runs one [`Session`] per connection.
pub struct Listener {
    listener: TcpListener,
    config: SessionConfig,
}

impl Listener {
    /// Bind to `address`. Port `0` picks a free port, see
    /// [`Listener::local_addr`].
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::BindFailed`] if the socket cannot be bound.
    pub async fn bind(address: SocketAddr, config: SessionConfig) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(address).await.map_err(|source| {
            ListenerError::BindFailed {
                address: address.to_string(),
                source,
            }
        })?;

        Ok(Self { listener, config })
    }

    /// The address actually bound.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::LocalAddr`] if the socket cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr, ListenerError> {
        self.listener.local_addr().map_err(ListenerError::LocalAddr)
    }

    /// Accept connections until `shutdown` fires, then stop accepting and wait
    /// for every running session to finish.
    ///
    /// Each session holds a clone of `queue`; the last clone is dropped when
    /// this returns, which closes the queue for the workers.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn serve(self, queue: QueueProducer, mut shutdown: broadcast::Receiver<Signal>) {
        let Self { listener, config } = self;
        let mut sessions = Vec::default();
        // Subscribed before each accept so a signal sent while a connection is
        // being set up still reaches its session.
        let mut next_signal = shutdown.resubscribe();

        if let Ok(address) = listener.local_addr() {
            internal!(level = INFO, "Serving SMTP on {address}");
        }

        loop {
            tokio::select! {
                biased;

                sig = shutdown.recv() => {
                    tracing::debug!("Listener received {sig:?}");
                    break;
                }

                connection = listener.accept() => {
                    let (stream, peer) = match connection {
                        Ok(connection) => connection,
                        Err(err) => {
                            internal!(level = WARN, "Failed to accept connection: {err}");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };

                    tracing::debug!("Connection received from {peer}");
                    sessions.retain(|session: &tokio::task::JoinHandle<()>| !session.is_finished());

                    let session = Session::create(stream, peer, queue.clone(), &config);
                    let signal = std::mem::replace(&mut next_signal, shutdown.resubscribe());

                    sessions.push(tokio::spawn(async move {
                        match session.run(signal).await {
                            Ok(()) => {}
                            Err(err) if err.is_shutdown() => {
                                internal!(level = DEBUG, "Session {peer} closed for shutdown");
                            }
                            Err(err) if err.is_client_error() => {
                                internal!(level = INFO, "Session {peer} ended: {err}");
                            }
                            Err(err) => internal!(level = WARN, "Session {peer} ended: {err}"),
                        }
                    }));
                }
            }
        }

        drop(listener);
        internal!(
            level = INFO,
            "Listener stopped accepting, finishing {} session(s) ...",
            sessions.len()
        );

        join_all(sessions).await;
        internal!(level = INFO, "All sessions finished");

        if !queue.is_empty() {
            internal!(level = INFO, "{} message(s) left for delivery", queue.len());
        }
    }
}
