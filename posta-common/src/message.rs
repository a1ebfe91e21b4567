//! An accepted mail submission.
//!
//! A [`Message`] is built once the terminating `.` of a DATA block has been
//! read, and is read-only from then on. Pushing it onto the
//! [`queue`](crate::queue) hands ownership to whichever worker pops it.

use std::time::SystemTime;

use ahash::AHashMap;
use ulid::Ulid;

use crate::error::MessageError;

/// Subject used when a submission carries no (or an empty) `Subject` header.
pub const DEFAULT_SUBJECT: &str = "(no subject)";

/// Header name to value, keys as the client sent them.
pub type Headers = AHashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: Ulid,
    sender: String,
    recipients: Vec<String>,
    subject: String,
    headers: Headers,
    body: String,
    received: SystemTime,
}

impl Message {
    /// Assemble a message.
    ///
    /// Any `Subject` header (matched case-insensitively) is pulled out of
    /// `headers`; `subject` takes precedence over it when given.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::NoRecipients`] if `recipients` is empty.
    pub fn new(
        sender: impl Into<String>,
        recipients: Vec<String>,
        subject: Option<String>,
        mut headers: Headers,
        body: impl Into<String>,
    ) -> Result<Self, MessageError> {
        if recipients.is_empty() {
            return Err(MessageError::NoRecipients);
        }

        let from_headers = take_subject(&mut headers);
        let subject = subject
            .or(from_headers)
            .map(|subject| subject.trim().to_string())
            .filter(|subject| !subject.is_empty())
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

        Ok(Self {
            id: Ulid::new(),
            sender: sender.into(),
            recipients,
            subject,
            headers,
            body: body.into(),
            received: SystemTime::now(),
        })
    }

    #[must_use]
    pub const fn id(&self) -> Ulid {
        self.id
    }

    /// Envelope sender, possibly empty.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Headers other than `Subject`.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub const fn received(&self) -> SystemTime {
        self.received
    }
}

fn take_subject(headers: &mut Headers) -> Option<String> {
    let key = headers
        .keys()
        .find(|name| name.eq_ignore_ascii_case("subject"))
        .cloned()?;

    headers.remove(&key)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{DEFAULT_SUBJECT, Headers, Message};
    use crate::error::MessageError;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn requires_recipients() {
        assert_eq!(
            Message::new("a@b.c", Vec::new(), None, Headers::new(), ""),
            Err(MessageError::NoRecipients)
        );
    }

    #[test]
    fn subject_defaults() {
        let message = Message::new(
            "a@b.c",
            vec!["d@e.f".to_string()],
            None,
            Headers::new(),
            "Hola",
        )
        .unwrap();
        assert_eq!(message.subject(), DEFAULT_SUBJECT);

        let message = Message::new(
            "a@b.c",
            vec!["d@e.f".to_string()],
            Some("   ".to_string()),
            Headers::new(),
            "Hola",
        )
        .unwrap();
        assert_eq!(message.subject(), DEFAULT_SUBJECT);
    }

    #[test]
    fn subject_header_is_extracted() {
        let message = Message::new(
            "a@b.c",
            vec!["d@e.f".to_string()],
            None,
            headers(&[("SUBJECT", "Prueba"), ("X-Mailer", "test")]),
            "Hola mundo!",
        )
        .unwrap();

        assert_eq!(message.subject(), "Prueba");
        assert_eq!(message.headers(), &headers(&[("X-Mailer", "test")]));
        assert_eq!(message.body(), "Hola mundo!");
        assert_eq!(message.recipients(), ["d@e.f".to_string()]);
        assert_eq!(message.sender(), "a@b.c");
    }

    #[test]
    fn ids_are_unique() {
        let make = || {
            Message::new("", vec!["d@e.f".to_string()], None, Headers::new(), "").unwrap()
        };

        assert_ne!(make().id(), make().id());
    }
}
