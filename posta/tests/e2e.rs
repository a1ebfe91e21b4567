//! Whole-server tests: SMTP in through the listener, out through a worker.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use posta::{Controller, Posta, Running};
use posta_common::message::Message;
use posta_delivery::{Deliver, DeliveryConfig, DeliveryError, PoolConfig, RelayConfig};
use posta_smtp::client::SmtpClient;
use pretty_assertions::assert_eq;
use tokio::sync::Mutex;

#[derive(Default)]
struct Recorder {
    delay: Duration,
    messages: Mutex<Vec<Message>>,
}

#[async_trait]
impl Deliver for Recorder {
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        tokio::time::sleep(self.delay).await;
        self.messages.lock().await.push(message.clone());
        Ok(())
    }
}

fn config() -> Posta {
    Posta {
        listen: "127.0.0.1:0".parse().unwrap(),
        banner: "e2e.test".to_string(),
        ..Posta::default()
    }
}

async fn start(config: Posta, recorder: &Arc<Recorder>) -> Running {
    Controller::with_delivery(config, recorder.clone())
        .unwrap()
        .start()
        .await
        .unwrap()
}

async fn send(running: &Running, subjects: &[&str]) {
    let mut client = SmtpClient::connect(&running.local_addr().to_string(), "localhost")
        .await
        .unwrap();

    assert!(
        client
            .read_greeting()
            .await
            .unwrap()
            .message()
            .starts_with("e2e.test")
    );
    assert!(client.ehlo("client.test").await.unwrap().is_success());

    for subject in subjects {
        assert!(client.mail_from("sender@example.com").await.unwrap().is_success());
        assert!(client.rcpt_to("rcpt@example.com").await.unwrap().is_success());
        assert_eq!(client.data().await.unwrap().code, 354);

        let content = format!("Subject: {subject}\nX-Test: yes\n\nHello\n.dotted");
        let queued = client.send_data(&content).await.unwrap();
        assert!(queued.message().starts_with("Ok: queued as "), "{queued}");
    }

    assert_eq!(client.quit().await.unwrap().code, 221);
}

#[tokio::test]
async fn message_reaches_delivery() {
    let recorder = Arc::new(Recorder::default());
    let running = start(config(), &recorder).await;

    send(&running, &["Prueba"]).await;
    running.shutdown().await;

    let messages = recorder.messages.lock().await;
    assert_eq!(messages.len(), 1);

    let message = &messages[0];
    assert_eq!(message.sender(), "sender@example.com");
    assert_eq!(message.recipients(), ["rcpt@example.com".to_string()]);
    assert_eq!(message.subject(), "Prueba");
    assert_eq!(message.headers().get("X-Test").map(String::as_str), Some("yes"));
    assert_eq!(message.body(), "Hello\n.dotted");
}

#[tokio::test]
async fn shutdown_drains_queue() {
    let recorder = Arc::new(Recorder {
        delay: Duration::from_millis(100),
        ..Recorder::default()
    });
    let config = Posta {
        pool: PoolConfig {
            workers: 1,
            ..PoolConfig::default()
        },
        ..config()
    };
    let running = start(config, &recorder).await;

    send(&running, &["one", "two", "three", "four"]).await;
    running.shutdown().await;

    let subjects = recorder
        .messages
        .lock()
        .await
        .iter()
        .map(|message| message.subject().to_string())
        .collect::<Vec<_>>();
    assert_eq!(subjects, ["one", "two", "three", "four"]);
}

#[tokio::test]
async fn relays_to_upstream() {
    let recorder = Arc::new(Recorder::default());
    let upstream = start(config(), &recorder).await;

    let relay = Posta {
        delivery: DeliveryConfig::Relay(RelayConfig {
            port: upstream.local_addr().port(),
            starttls: false,
            from: Some("relay@example.com".to_string()),
            ..RelayConfig::new("127.0.0.1")
        }),
        ..config()
    };
    let edge = Controller::new(relay).unwrap().start().await.unwrap();

    send(&edge, &["Relayed"]).await;
    edge.shutdown().await;
    upstream.shutdown().await;

    let messages = recorder.messages.lock().await;
    assert_eq!(messages.len(), 1);

    let message = &messages[0];
    let header = |name: &str| message.headers().get(name).cloned().unwrap_or_default();

    assert_eq!(message.sender(), "relay@example.com");
    assert_eq!(message.recipients(), ["rcpt@example.com".to_string()]);
    assert_eq!(message.subject(), "Relayed");
    assert_eq!(message.body(), "Hello\n.dotted");
    assert_eq!(header("From"), "relay@example.com");
    assert_eq!(header("To"), "rcpt@example.com");
    assert_eq!(header("MIME-Version"), "1.0");
    assert_eq!(header("Content-Type"), "text/plain; charset=UTF-8");
    assert_eq!(header("X-Test"), "yes");
}

#[tokio::test]
async fn invalid_configuration_is_rejected() {
    let config = Posta {
        queue_capacity: 0,
        ..config()
    };

    assert!(Controller::new(config).is_err());
}
