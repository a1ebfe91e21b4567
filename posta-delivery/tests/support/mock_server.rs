//! Scripted upstream SMTP server for relay tests.
//!
//! Every reply can be overridden through the builder, and everything the
//! relay sends is recorded for later assertions.
#![allow(dead_code)]

use std::{fmt::Write, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::Mutex,
    task::JoinHandle,
};

/// What the mock server saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    StartTls,
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Raw lines between DATA and the terminating dot, CRLF included
    MessageContent(String),
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Debug, Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    ehlo_code: u16,
    capabilities: Vec<String>,
    helo_response: SmtpResponse,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,
    /// Stop answering once this many commands were read (0-indexed)
    hang_on_command: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            ehlo_code: 250,
            capabilities: vec!["mock.test".to_string(), "AUTH PLAIN".to_string()],
            helo_response: SmtpResponse::new(250, "Hello"),
            auth_response: SmtpResponse::new(235, "Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            quit_response: SmtpResponse::new(221, "Bye"),
            hang_on_command: None,
        }
    }
}

impl MockServerConfig {
    fn ehlo_bytes(&self) -> Vec<u8> {
        if self.ehlo_code >= 400 {
            return SmtpResponse::new(self.ehlo_code, "EHLO not supported").to_bytes();
        }

        let mut response = String::new();
        let last = self.capabilities.len().saturating_sub(1);

        for (i, capability) in self.capabilities.iter().enumerate() {
            let separator = if i < last { '-' } else { ' ' };
            let _ = write!(response, "{}{separator}{capability}\r\n", self.ehlo_code);
        }

        response.into_bytes()
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<SmtpCommand>>>,
    task: JoinHandle<()>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: MockServerConfig::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.lock().await.clone()
    }

    /// The content of the first message received, if any.
    pub async fn message(&self) -> Option<String> {
        self.commands
            .lock()
            .await
            .iter()
            .find_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content.clone()),
                _ => None,
            })
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<Mutex<Vec<SmtpCommand>>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut count = 0;

        writer.write_all(&config.greeting.to_bytes()).await?;

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            if config.hang_on_command == Some(count) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }
            count += 1;

            let command_line = line.trim_end().to_string();
            let (verb, argument) = command_line
                .split_once(' ')
                .map_or((command_line.as_str(), ""), |(verb, rest)| (verb, rest));

            let (response, command) = match verb.to_uppercase().as_str() {
                "EHLO" => (config.ehlo_bytes(), SmtpCommand::Ehlo(argument.to_string())),
                "HELO" => (
                    config.helo_response.to_bytes(),
                    SmtpCommand::Helo(argument.to_string()),
                ),
                "STARTTLS" => (
                    SmtpResponse::new(454, "TLS not available").to_bytes(),
                    SmtpCommand::StartTls,
                ),
                "AUTH" => (
                    config.auth_response.to_bytes(),
                    SmtpCommand::Auth(argument.to_string()),
                ),
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    SmtpCommand::MailFrom(argument.to_string()),
                ),
                "RCPT" => (
                    config.rcpt_to_response.to_bytes(),
                    SmtpCommand::RcptTo(argument.to_string()),
                ),
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "QUIT" => (config.quit_response.to_bytes(), SmtpCommand::Quit),
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(command_line.clone()),
                ),
            };

            commands.lock().await.push(command.clone());
            writer.write_all(&response).await?;

            match command {
                SmtpCommand::Quit => return Ok(()),
                SmtpCommand::Data if config.data_response.code == 354 => {
                    let mut content = String::new();

                    loop {
                        line.clear();
                        if reader.read_line(&mut line).await? == 0 {
                            return Ok(());
                        }
                        if line.trim_end() == "." {
                            break;
                        }
                        content.push_str(&line);
                    }

                    commands
                        .lock()
                        .await
                        .push(SmtpCommand::MessageContent(content));
                    writer
                        .write_all(&config.data_end_response.to_bytes())
                        .await?;
                }
                _ => {}
            }
        }
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// EHLO reply code and advertised lines (the first line is the domain)
    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, capabilities: Vec<String>) -> Self {
        self.config.ehlo_code = code;
        self.config.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub const fn with_hang_on_command(mut self, command_index: usize) -> Self {
        self.config.hang_on_command = Some(command_index);
        self
    }

    /// Bind to a free local port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind.
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&commands);

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let config = Arc::clone(&config);
                let commands = Arc::clone(&recorded);

                tokio::spawn(async move {
                    let _ = MockSmtpServer::handle_client(stream, config, commands).await;
                });
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands,
            task,
        })
    }
}
