//! Relays queued messages to a single upstream SMTP server.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use posta_common::{
    config::{ClientTimeouts, TimeoutConfig},
    internal,
    message::Message,
    tracing,
};
use posta_smtp::client::{ClientError, Response, SmtpClient};
use serde::Deserialize;

use crate::{Deliver, error::DeliveryError, render::render};

mod defaults {
    pub const fn port() -> u16 {
        587
    }

    pub fn helo() -> String {
        String::from("localhost")
    }

    pub const fn starttls() -> bool {
        true
    }
}

/// Login for the upstream server. The password itself never lives in the
/// configuration file, only the name of the environment variable holding it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password_env: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: String,

    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Name sent with EHLO/HELO
    #[serde(default = "defaults::helo")]
    pub helo: String,

    /// Envelope sender and `From:` header; the message sender when unset
    #[serde(default)]
    pub from: Option<String>,

    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Require a STARTTLS upgrade before sending anything else
    #[serde(default = "defaults::starttls")]
    pub starttls: bool,

    /// Skip certificate verification (testing only)
    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default)]
    pub timeouts: ClientTimeouts,
}

impl RelayConfig {
    /// A relay to `host` with every other setting at its default.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: defaults::port(),
            helo: defaults::helo(),
            from: None,
            credentials: None,
            starttls: defaults::starttls(),
            accept_invalid_certs: false,
            timeouts: ClientTimeouts::default(),
        }
    }
}

/// [`Deliver`] implementation speaking SMTP to the configured relay.
pub struct SmtpRelay {
    config: RelayConfig,
    password: Option<String>,
}

impl SmtpRelay {
    /// Build a relay, reading the password from the process environment.
    ///
    /// # Errors
    ///
    /// See [`SmtpRelay::with_lookup`].
    pub fn new(config: RelayConfig) -> Result<Self, DeliveryError> {
        Self::with_lookup(config, |name| std::env::var(name).ok())
    }

    /// Build a relay, resolving the password variable through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if the host is empty or the
    /// password variable is not set.
    pub fn with_lookup(
        config: RelayConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DeliveryError> {
        if config.host.trim().is_empty() {
            return Err(DeliveryError::Configuration(
                "relay host must not be empty".to_string(),
            ));
        }

        let password = match &config.credentials {
            Some(credentials) => Some(lookup(&credentials.password_env).ok_or_else(|| {
                DeliveryError::Configuration(format!(
                    "relay password variable {} is not set",
                    credentials.password_env
                ))
            })?),
            None => None,
        };

        if config.accept_invalid_certs {
            internal!(
                level = WARN,
                "TLS certificate validation is disabled for relay {}",
                config.host
            );
        }

        Ok(Self { config, password })
    }

    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    async fn connect(&self) -> Result<SmtpClient, DeliveryError> {
        let address = self.address();
        let limit = self.config.timeouts.connect_timeout();

        let client = tokio::time::timeout(
            limit,
            SmtpClient::connect(&address, self.config.host.as_str()),
        )
        .await
        .map_err(|_| DeliveryError::Timeout {
            step: "connect",
            after: limit,
        })?
        .map_err(|err| DeliveryError::Connection(format!("{address}: {err}")))?;

        Ok(client.accept_invalid_certs(self.config.accept_invalid_certs))
    }

    /// Greet with EHLO, falling back to HELO for servers that refuse it.
    async fn greet(&self, client: &mut SmtpClient) -> Result<Response, DeliveryError> {
        let limit = self.config.timeouts.command_timeout();
        let response = step("EHLO", limit, client.ehlo(&self.config.helo)).await?;

        if response.is_permanent_error() {
            tracing::debug!("EHLO refused ({response}), falling back to HELO");
            let response = step("HELO", limit, client.helo(&self.config.helo)).await?;
            return require("HELO", response, Response::is_success);
        }

        require("EHLO", response, Response::is_success)
    }

    async fn transaction(
        &self,
        client: &mut SmtpClient,
        message: &Message,
    ) -> Result<(), DeliveryError> {
        let limit = self.config.timeouts.command_timeout();

        let greeting = step("greeting", limit, client.read_greeting()).await?;
        require("Connection", greeting, Response::is_success)?;

        let mut capabilities = self.greet(client).await?;

        if self.config.starttls {
            if !capabilities.has_capability("STARTTLS") {
                return Err(DeliveryError::Permanent(format!(
                    "{} does not offer STARTTLS",
                    self.config.host
                )));
            }

            let response = step("STARTTLS", limit, client.starttls()).await?;
            require("STARTTLS", response, Response::is_success)?;
            capabilities = self.greet(client).await?;
        }

        if let (Some(credentials), Some(password)) = (&self.config.credentials, &self.password) {
            if !capabilities.has_capability("AUTH") {
                internal!(
                    level = DEBUG,
                    "{} does not advertise AUTH, trying anyway",
                    self.config.host
                );
            }

            let response = step(
                "AUTH",
                limit,
                client.auth_plain(&credentials.username, password),
            )
            .await?;
            require("AUTH", response, Response::is_success)?;
        }

        let from = self.config.from.as_deref().unwrap_or_else(|| message.sender());

        let response = step("MAIL FROM", limit, client.mail_from(from)).await?;
        require("MAIL FROM", response, Response::is_success)?;

        for recipient in message.recipients() {
            let response = step("RCPT TO", limit, client.rcpt_to(recipient)).await?;
            require("RCPT TO", response, Response::is_success)?;
        }

        let response = step("DATA", limit, client.data()).await?;
        require("DATA", response, Response::is_intermediate)?;

        let content = render(message, from);
        let response = step(
            "message data",
            self.config.timeouts.data_timeout(),
            client.send_data(&content),
        )
        .await?;
        require("Message", response, Response::is_success)?;

        Ok(())
    }
}

/// Run one client call under `limit`.
async fn step<T>(
    name: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, DeliveryError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| DeliveryError::Timeout {
            step: name,
            after: limit,
        })?
        .map_err(DeliveryError::from)
}

fn require(
    name: &str,
    response: Response,
    accept: impl Fn(&Response) -> bool,
) -> Result<Response, DeliveryError> {
    if accept(&response) {
        Ok(response)
    } else {
        Err(DeliveryError::rejected(name, &response))
    }
}

#[async_trait]
impl Deliver for SmtpRelay {
    #[tracing::instrument(level = "debug", skip_all, fields(id = %message.id()))]
    async fn deliver(&self, message: &Message) -> Result<(), DeliveryError> {
        let mut client = self.connect().await?;
        self.transaction(&mut client, message).await?;

        let limit = self.config.timeouts.command_timeout();
        match tokio::time::timeout(limit, client.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => tracing::debug!("QUIT after delivery failed: {err}"),
            Err(_) => tracing::debug!("QUIT after delivery timed out after {limit:?}"),
        }

        Ok(())
    }
}
