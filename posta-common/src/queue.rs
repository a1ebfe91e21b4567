//! Bounded hand-off between intake sessions and delivery workers.
//!
//! [`bounded`] creates a producer/consumer pair over a single FIFO buffer.
//! Both halves are cheap to clone. Pushing onto a full queue waits for a
//! worker to free a slot, which is how backpressure reaches SMTP clients.
//!
//! The queue closes once every [`QueueProducer`] has been dropped: consumers
//! keep receiving whatever is still buffered and then see `None`.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::{error::QueueError, message::Message};

/// Capacity used when nothing else is configured.
pub const DEFAULT_CAPACITY: usize = 100;

/// Create a queue holding at most `capacity` messages.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn bounded(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (sender, receiver) = mpsc::channel(capacity);

    (
        QueueProducer { sender },
        QueueConsumer {
            receiver: Arc::new(Mutex::new(receiver)),
        },
    )
}

#[derive(Debug, Clone)]
pub struct QueueProducer {
    sender: mpsc::Sender<Message>,
}

impl QueueProducer {
    /// Enqueue `message`, waiting for space if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] when no consumer is left to drain the
    /// queue. The message is dropped in that case.
    pub async fn push(&self, message: Message) -> Result<(), QueueError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| QueueError::Closed)
    }

    /// Number of messages currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

#[derive(Debug, Clone)]
pub struct QueueConsumer {
    receiver: Arc<Mutex<mpsc::Receiver<Message>>>,
}

impl QueueConsumer {
    /// Wait for the next message.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn pop(&self) -> Option<Message> {
        self.receiver.lock().await.recv().await
    }
}
