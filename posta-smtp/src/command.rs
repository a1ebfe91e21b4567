use core::fmt::{self, Display, Formatter};

use posta_common::status::Status;
use thiserror::Error;

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl HeloVariant {
    /// The name the client introduced itself with, possibly empty.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Ehlo(id) | Self::Helo(id) => id,
        }
    }
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Command {
    Helo(HeloVariant),
    MailFrom(String),
    RcptTo(String),
    Data,
    Quit,
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(variant) => write!(fmt, "{variant} {}", variant.id()),
            Self::MailFrom(sender) => write!(fmt, "MAIL FROM:<{sender}>"),
            Self::RcptTo(recipient) => write!(fmt, "RCPT TO:<{recipient}>"),
            Self::Data => fmt.write_str("DATA"),
            Self::Quit => fmt.write_str("QUIT"),
        }
    }
}

/// A line that could not be turned into a [`Command`].
///
/// The `Display` text is what gets sent back to the client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,

    #[error("Command unrecognised: {0}")]
    Unrecognised(String),

    #[error("Syntax error in parameters, expected {0}")]
    Malformed(&'static str),
}

impl CommandError {
    /// The reply code this error is reported with.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::Empty | Self::Unrecognised(_) => Status::UnrecognisedCommand,
            Self::Malformed(_) => Status::InvalidArguments,
        }
    }
}

/// Pull the address out of a `FROM:`/`TO:` argument.
///
/// Accepts `<addr>`, `< addr >` and a bare `addr`; anything after the
/// address (such as ESMTP parameters) is ignored.
fn parse_path<'a>(argument: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = argument
        .get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| argument[prefix.len()..].trim_start())?;

    let address = rest.strip_prefix('<').map_or_else(
        || rest.split_whitespace().next().unwrap_or_default(),
        |inner| inner.split_once('>').map_or(inner, |(address, _)| address),
    );

    Some(address.trim()).filter(|address| !address.is_empty())
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(CommandError::Empty);
        }

        let (verb, argument) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(verb, argument)| (verb, argument.trim()));

        if verb.eq_ignore_ascii_case("HELO") {
            Ok(Self::Helo(HeloVariant::Helo(argument.to_string())))
        } else if verb.eq_ignore_ascii_case("EHLO") {
            Ok(Self::Helo(HeloVariant::Ehlo(argument.to_string())))
        } else if verb.eq_ignore_ascii_case("MAIL") {
            parse_path(argument, "FROM:")
                .map(|sender| Self::MailFrom(sender.to_string()))
                .ok_or(CommandError::Malformed("MAIL FROM:<address>"))
        } else if verb.eq_ignore_ascii_case("RCPT") {
            parse_path(argument, "TO:")
                .map(|recipient| Self::RcptTo(recipient.to_string()))
                .ok_or(CommandError::Malformed("RCPT TO:<address>"))
        } else if verb.eq_ignore_ascii_case("DATA") {
            Ok(Self::Data)
        } else if verb.eq_ignore_ascii_case("QUIT") {
            Ok(Self::Quit)
        } else {
            Err(CommandError::Unrecognised(verb.to_string()))
        }
    }
}
