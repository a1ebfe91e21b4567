use async_trait::async_trait;
use posta_common::{internal, message::Message, tracing};

use crate::{Deliver, error::DeliveryError, render::render};

/// Delivery that only records what would have been sent.
///
/// Used when no relay is configured, so the server can run standalone.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

#[async_trait]
impl Deliver for LogDelivery {
    #[tracing::instrument(level = "trace", skip_all, fields(id = %message.id()))]
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        internal!(
            level = INFO,
            "Message {} from {} to {} ({:?}, {} bytes, queued {}ms)",
            message.id(),
            message.sender(),
            message.recipients().join(", "),
            message.subject(),
            render(message, message.sender()).len(),
            message.received().elapsed().unwrap_or_default().as_millis()
        );

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use posta_common::message::{Headers, Message};

    use super::LogDelivery;
    use crate::Deliver;

    #[tokio::test]
    async fn always_succeeds() {
        let message = Message::new(
            "sender@example.com",
            vec!["rcpt@example.com".into()],
            None,
            Headers::default(),
            "body",
        )
        .unwrap();

        assert!(LogDelivery.deliver(&message).await.is_ok());
    }
}
