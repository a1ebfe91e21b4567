//! Turns a queued [`Message`] back into RFC 5322 text for relaying.

use core::fmt::Write;

use posta_common::message::Message;

/// Headers that [`render`] writes itself.
const GENERATED: [&str; 4] = ["From", "To", "MIME-Version", "Content-Type"];

/// Render `message` with `from` in the `From:` header.
///
/// Every line, including the last body line, ends in CRLF.
#[must_use]
pub fn render(message: &Message, from: &str) -> String {
    let mut out = String::with_capacity(message.body().len() + 256);

    let _ = write!(out, "From: {from}\r\n");
    let _ = write!(out, "To: {}\r\n", message.recipients().join(", "));
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str("Content-Type: text/plain; charset=UTF-8\r\n");

    let mut headers = message
        .headers()
        .iter()
        .filter(|(name, _)| {
            !GENERATED
                .iter()
                .any(|generated| generated.eq_ignore_ascii_case(name))
        })
        .collect::<Vec<_>>();
    headers.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

    for (name, value) in headers {
        let _ = write!(out, "{name}: {value}\r\n");
    }

    let _ = write!(out, "Subject: {}\r\n\r\n", message.subject());

    for line in message.body().lines() {
        out.push_str(line);
        out.push_str("\r\n");
    }

    out
}
