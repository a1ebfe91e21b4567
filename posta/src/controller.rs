use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use posta_common::{Signal, internal, logging, queue, tracing};
use posta_delivery::{Deliver, WorkerPool};
use posta_smtp::Listener;
use tokio::{sync::broadcast, task::JoinHandle};

use crate::config::Posta;

/// Owns the queue, the listener and the worker pool, and tears them down in
/// order on shutdown.
pub struct Controller {
    config: Posta,
    delivery: Arc<dyn Deliver>,
}

/// A started [`Controller`].
pub struct Running {
    local_addr: SocketAddr,
    signal: broadcast::Sender<Signal>,
    listener: JoinHandle<()>,
    pool: WorkerPool,
}

impl Controller {
    /// Validate `config` and build the delivery it names.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the delivery cannot
    /// be set up.
    pub fn new(config: Posta) -> anyhow::Result<Self> {
        config.validate()?;
        let delivery = config.delivery()?;

        Ok(Self { config, delivery })
    }

    /// Use `delivery` instead of the configured one.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_delivery(config: Posta, delivery: Arc<dyn Deliver>) -> anyhow::Result<Self> {
        config.validate()?;

        Ok(Self { config, delivery })
    }

    /// Bind the listener and start the workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address cannot be bound.
    pub async fn start(self) -> anyhow::Result<Running> {
        let Self { config, delivery } = self;

        let (producer, consumer) = queue::bounded(config.queue_capacity);
        let (signal, receiver) = broadcast::channel(16);

        let listener = Listener::bind(config.listen, config.session())
            .await
            .context("Failed to start SMTP listener")?;
        let local_addr = listener.local_addr()?;

        let pool = WorkerPool::start(&config.pool, consumer, delivery);
        let listener = tokio::spawn(listener.serve(producer, receiver));

        internal!(
            level = INFO,
            "Accepting mail on {local_addr} (queue capacity {})",
            config.queue_capacity
        );

        Ok(Running {
            local_addr,
            signal,
            listener,
            pool,
        })
    }

    /// Run until Ctrl+C or SIGTERM, then shut down gracefully.
    ///
    /// A second Ctrl+C while draining abandons whatever is still queued.
    ///
    /// # Errors
    ///
    /// Returns an error if startup fails or the signal handlers cannot be
    /// installed.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let running = self.start().await?;
        internal!("Controller running");

        wait_for_signal().await?;

        tokio::select! {
            () = running.shutdown() => {}
            _ = tokio::signal::ctrl_c() => {
                internal!(level = WARN, "Forced shutdown, queued messages were not delivered");
            }
        }

        internal!("Shut down");
        Ok(())
    }
}

impl Running {
    /// The address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, let open sessions finish, then drain the queue.
    pub async fn shutdown(self) {
        let Self {
            signal,
            listener,
            pool,
            ..
        } = self;

        internal!(level = INFO, "Shutting down ...");

        if signal.send(Signal::Shutdown).is_err() {
            internal!(level = DEBUG, "Listener already stopped");
        }

        if let Err(err) = listener.await {
            internal!(level = ERROR, "Listener task failed: {err}");
        }

        if pool.is_empty() {
            internal!(level = WARN, "No delivery workers left to drain the queue");
        } else {
            internal!(level = INFO, "Draining queue with {} worker(s) ...", pool.len());
        }

        pool.join().await;
    }
}

async fn wait_for_signal() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    }

    Ok(())
}
