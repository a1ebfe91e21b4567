//! SMTP response parsing and representation.

use core::fmt::{self, Display, Formatter};

use super::error::{ClientError, Result};

/// Represents a single line in an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// `false` for the `250-` lines of a multi-line response
    pub is_last: bool,
    pub message: String,
}

/// Represents a complete SMTP response, which may be multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns the complete message as a single string with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns `true` if this response indicates success (2xx code).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns `true` for 3xx intermediate replies, such as the 354 after DATA.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Returns `true` if this response indicates a temporary error (4xx code).
    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    /// Returns `true` if this response indicates a permanent error (5xx code).
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Returns `true` if this response indicates any error (4xx or 5xx code).
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_temporary_error() || self.is_permanent_error()
    }

    /// Whether an EHLO response advertises `keyword` (case-insensitive).
    #[must_use]
    pub fn has_capability(&self, keyword: &str) -> bool {
        self.lines.iter().skip(1).any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
        })
    }

    /// Parses a single response line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code = line
            .get(..3)
            .ok_or_else(|| ClientError::ParseError(format!("Response line too short: '{line}'")))?;
        let code = code
            .parse::<u16>()
            .map_err(|_| ClientError::ParseError(format!("Invalid status code: '{code}'")))?;

        let is_last = match line.as_bytes().get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(c) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    char::from(*c)
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: line.get(4..).unwrap_or_default().to_string(),
        })
    }

    /// Parses a complete, possibly multi-line, response from the front of
    /// `buffer`.
    ///
    /// Returns the parsed `Response` and the number of bytes consumed, or
    /// `None` if more data is needed.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the response is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut lines = Vec::new();
        let mut consumed = 0;
        let mut first_code = None;

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let text = std::str::from_utf8(raw)?;
            let text = text.strip_suffix('\r').unwrap_or(text);
            if text.is_empty() {
                continue;
            }

            let parsed = Self::parse_line(text)?;

            match first_code {
                Some(code) if parsed.code != code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {code}, got {}",
                        parsed.code
                    )));
                }
                Some(_) => {}
                None => first_code = Some(parsed.code),
            }

            lines.push(parsed.message);

            if parsed.is_last {
                return Ok(Some((Self::new(parsed.code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" / "))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_single_line() {
        assert_eq!(
            Response::parse_line("220 mail.example.com ESMTP").unwrap(),
            ResponseLine {
                code: 220,
                is_last: true,
                message: "mail.example.com ESMTP".to_string(),
            }
        );
        assert_eq!(
            Response::parse_line("250").unwrap(),
            ResponseLine {
                code: 250,
                is_last: true,
                message: String::new(),
            }
        );
        assert!(Response::parse_line("25").is_err());
        assert!(Response::parse_line("abc hello").is_err());
        assert!(Response::parse_line("250_hello").is_err());
    }

    #[test]
    fn parse_complete_response() {
        let (response, consumed) = Response::parse_response(b"250 OK\r\n").unwrap().unwrap();
        assert_eq!(response, Response::new(250, vec!["OK".to_string()]));
        assert_eq!(consumed, 8);
    }

    #[test]
    fn parse_multi_line_response() {
        let data = b"250-mail.example.com\r\n250-AUTH PLAIN LOGIN\r\n250 STARTTLS\r\n354 next";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();

        assert_eq!(response.code, 250);
        assert_eq!(
            response.lines,
            vec!["mail.example.com", "AUTH PLAIN LOGIN", "STARTTLS"]
        );
        assert_eq!(consumed, 59);
        assert!(response.has_capability("starttls"));
        assert!(response.has_capability("AUTH"));
        assert!(!response.has_capability("mail.example.com"));
    }

    #[test]
    fn parse_incomplete_response() {
        assert!(
            Response::parse_response(b"250-mail.example.com\r\n250-SIZE")
                .unwrap()
                .is_none()
        );
        assert!(Response::parse_response(b"").unwrap().is_none());
    }

    #[test]
    fn mismatched_codes() {
        assert!(Response::parse_response(b"250-one\r\n550 two\r\n").is_err());
    }

    #[test]
    fn classification() {
        let response = Response::new(250, vec!["OK".to_string()]);
        assert!(response.is_success());
        assert!(!response.is_error());

        let response = Response::new(354, vec!["Go ahead".to_string()]);
        assert!(response.is_intermediate());

        let response = Response::new(451, vec!["Later".to_string()]);
        assert!(response.is_temporary_error());
        assert!(response.is_error());

        let response = Response::new(550, vec!["Error".to_string()]);
        assert!(response.is_permanent_error());
        assert!(!response.is_success());
        assert_eq!(response.to_string(), "550 Error");
    }
}
