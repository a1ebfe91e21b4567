//! Fixed set of workers draining the queue.

use std::{sync::Arc, time::Duration};

use posta_common::{internal, message::Message, queue::QueueConsumer, tracing};
use serde::Deserialize;
use tokio::task::JoinSet;

use crate::{Deliver, error::DeliveryError};

mod defaults {
    pub const fn workers() -> usize {
        4
    }

    pub const fn delivery_timeout_secs() -> u64 {
        60
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of concurrent delivery workers
    ///
    /// Default: 4
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Upper bound on a single delivery attempt (in seconds)
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: defaults::workers(),
            delivery_timeout_secs: defaults::delivery_timeout_secs(),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub const fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if there are no workers or the
    /// delivery timeout is zero.
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.workers == 0 {
            return Err(DeliveryError::Configuration(
                "pool.workers must be at least 1".to_string(),
            ));
        }

        if self.delivery_timeout_secs == 0 {
            return Err(DeliveryError::Configuration(
                "pool.delivery_timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Long-lived delivery workers sharing one [`QueueConsumer`].
///
/// Workers exit once the queue is closed and empty, so dropping every
/// producer and then awaiting [`WorkerPool::join`] drains what was accepted.
pub struct WorkerPool {
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Spawn `config.workers` workers onto the current runtime.
    #[must_use]
    pub fn start(config: &PoolConfig, queue: QueueConsumer, delivery: Arc<dyn Deliver>) -> Self {
        let mut workers = JoinSet::new();
        let limit = config.delivery_timeout();

        for worker in 0..config.workers {
            let queue = queue.clone();
            let delivery = Arc::clone(&delivery);

            workers.spawn(async move {
                while let Some(message) = queue.pop().await {
                    process(worker, delivery.as_ref(), &message, limit).await;
                }

                internal!(level = DEBUG, "Worker {worker} finished, queue closed");
            });
        }

        internal!(level = INFO, "Started {} delivery worker(s)", config.workers);

        Self { workers }
    }

    /// Number of workers still running.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to drain the queue and exit.
    pub async fn join(mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(err) = result {
                internal!(level = ERROR, "Delivery worker failed: {err}");
            }
        }

        internal!(level = INFO, "All delivery workers finished");
    }
}

#[tracing::instrument(level = "trace", skip(delivery, message, limit), fields(id = %message.id()))]
async fn process(worker: usize, delivery: &dyn Deliver, message: &Message, limit: Duration) {
    match tokio::time::timeout(limit, delivery.deliver(message)).await {
        Ok(Ok(())) => internal!(level = INFO, "Delivered message {}", message.id()),
        Ok(Err(err)) => internal!(
            level = ERROR,
            "Failed to deliver message {} ({}): {err}",
            message.id(),
            if err.is_permanent() {
                "permanent"
            } else {
                "temporary"
            }
        ),
        Err(_) => internal!(
            level = WARN,
            "Delivery of message {} timed out after {limit:?}",
            message.id()
        ),
    }
}
