//! Outbound SMTP client used to relay queued messages.
//!
//! Supports plain TCP with an optional STARTTLS upgrade and `AUTH PLAIN`.
//!
//! ```no_run
//! use posta_smtp::client::SmtpClient;
//!
//! # async fn example() -> Result<(), posta_smtp::client::ClientError> {
//! let mut client = SmtpClient::connect("smtp.example.com:587", "smtp.example.com").await?;
//! client.read_greeting().await?;
//! client.ehlo("client.example.com").await?;
//! client.starttls().await?;
//! client.ehlo("client.example.com").await?;
//! client.mail_from("sender@example.com").await?;
//! client.rcpt_to("recipient@example.com").await?;
//! client.data().await?;
//! client.send_data("Subject: Test\r\n\r\nHello World").await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
