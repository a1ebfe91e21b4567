//! Accumulates the content of a DATA block.
//!
//! Lines are fed in one at a time. Until the first blank line, `name: value`
//! lines are headers; a line without a colon ends the headers early and is
//! kept as the first body line. The block ends at a line holding only `.`.

use posta_common::{
    error::MessageError,
    message::{Headers, Message},
};

#[derive(Debug, Default)]
pub struct MessageData {
    headers: Headers,
    subject: Option<String>,
    body: Vec<String>,
    in_body: bool,
}

impl MessageData {
    /// Feed one line, terminator already stripped.
    ///
    /// Returns `true` once the terminating `.` line has been seen; the line is
    /// not stored.
    pub fn push(&mut self, line: String) -> bool {
        if line == "." {
            return true;
        }

        // Transparency: a leading dot was doubled by the client
        let line = match line.strip_prefix('.') {
            Some(rest) if rest.starts_with('.') => rest.to_string(),
            _ => line,
        };

        if !self.in_body {
            if line.is_empty() {
                self.in_body = true;
                return false;
            }

            if let Some((name, value)) = line.split_once(':') {
                let (name, value) = (name.trim(), value.trim());

                if name.eq_ignore_ascii_case("subject") {
                    self.subject = Some(value.to_string());
                } else {
                    self.headers.insert(name.to_string(), value.to_string());
                }

                return false;
            }

            self.in_body = true;
        }

        self.body.push(line);
        false
    }

    /// Build the [`Message`] for the given envelope.
    pub fn into_message(
        self,
        sender: String,
        recipients: Vec<String>,
    ) -> Result<Message, MessageError> {
        Message::new(
            sender,
            recipients,
            self.subject,
            self.headers,
            self.body.join("\n"),
        )
    }
}
