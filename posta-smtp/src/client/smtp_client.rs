//! SMTP client implementation with support for STARTTLS.

use std::sync::Arc;

use base64::Engine;
use posta_common::{incoming, outgoing, tracing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{
        self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

use super::{
    error::{ClientError, Result},
    response::Response,
};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client connection that can be either plain TCP or TLS-wrapped.
enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            Self::Tls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade_to_tls(self, domain: &str, accept_invalid_certs: bool) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            ));
        };

        let mut root_store = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        let (added, ignored) = root_store.add_parsable_certificates(certs.certs);
        if !certs.errors.is_empty() || ignored > 0 {
            tracing::warn!(
                errors = ?certs.errors,
                ignored,
                "Some native certificates could not be loaded"
            );
        }
        tracing::trace!("Loaded {added} native root certificates");

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ClientError::TlsError(e.to_string()))?
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if accept_invalid_certs {
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerifier));
        }

        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| ClientError::TlsError(format!("Invalid domain: {e}")))?;

        let stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::TlsError(e.to_string()))?;

        Ok(Self::Tls(Box::new(stream)))
    }
}

/// A certificate verifier that accepts every certificate.
///
/// Only installed when the relay is configured with `accept_invalid_certs`.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ED25519,
        ]
    }
}

/// Encode a message body for the DATA phase.
///
/// Line endings become CRLF, lines starting with `.` are dot-stuffed and the
/// `.` terminator line is appended.
pub(crate) fn encode_data(data: &str) -> String {
    let mut encoded = String::with_capacity(data.len() + 64);

    for line in data.lines() {
        if line.starts_with('.') {
            encoded.push('.');
        }
        encoded.push_str(line);
        encoded.push_str("\r\n");
    }

    encoded.push_str(".\r\n");
    encoded
}

/// An SMTP client for sending commands and receiving responses.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_domain: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    /// Connect to `addr` (`host:port`). `server_domain` is the name checked
    /// against the server certificate after STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str, server_domain: impl Into<String>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self {
            connection: Some(ClientConnection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            server_domain: server_domain.into(),
            accept_invalid_certs: false,
        })
    }

    /// Skip certificate verification after STARTTLS.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Whether the connection has been upgraded with STARTTLS.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.connection, Some(ClientConnection::Tls(_)))
    }

    /// Reads the initial server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(data)
            .await
    }

    /// Sends a raw command and reads the response.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        outgoing!("{command}");
        self.send_raw(format!("{command}\r\n").as_bytes()).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// Sends STARTTLS and, if the server accepts, upgrades the connection.
    ///
    /// The server forgets everything it learned from the previous EHLO, so
    /// callers must greet again afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the command or the TLS handshake fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let connection = self
                .connection
                .take()
                .ok_or(ClientError::ConnectionClosed)?;

            self.connection = Some(
                connection
                    .upgrade_to_tls(&self.server_domain, self.accept_invalid_certs)
                    .await?,
            );
            self.buffer_pos = 0;
        }

        Ok(response)
    }

    /// Authenticates with `AUTH PLAIN` and an initial response.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Response> {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("\0{username}\0{password}"));

        outgoing!("AUTH PLAIN <redacted>");
        self.send_raw(format!("AUTH PLAIN {token}\r\n").as_bytes())
            .await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message content followed by the end-of-data marker.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_data(&mut self, data: &str) -> Result<Response> {
        outgoing!("<{} bytes of message data>", data.len());
        self.send_raw(encode_data(data).as_bytes()).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{response}");
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}
