use core::fmt::{self, Display, Formatter};
use std::borrow::Cow;

use posta_common::status::Status;

use crate::command::{Command, HeloVariant};

/// What a transition answers the client with.
pub type Reply = (Status, Cow<'static, str>);

/// Where a session is in the submission sequence.
///
/// Sequencing follows RFC 5321: HELO/EHLO before MAIL, MAIL before RCPT,
/// and at least one RCPT before DATA.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum State {
    /// Connected, not yet introduced
    #[default]
    Init,
    /// HELO/EHLO seen, no transaction in progress
    Greeted,
    HaveSender {
        sender: String,
    },
    HaveRecipients {
        sender: String,
        recipients: Vec<String>,
    },
    /// DATA accepted, message content is being read
    ReadingData {
        sender: String,
        recipients: Vec<String>,
    },
    Closed,
}

impl Display for State {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(match self {
            Self::Init => "Init",
            Self::Greeted => "Greeted",
            Self::HaveSender { .. } => "MAIL",
            Self::HaveRecipients { .. } => "RCPT",
            Self::ReadingData { .. } => "DATA",
            Self::Closed => "Closed",
        })
    }
}

const fn ok() -> Reply {
    (Status::Ok, Cow::Borrowed("Ok"))
}

fn hello(variant: &HeloVariant) -> Reply {
    let text = match variant.id() {
        "" => Cow::Borrowed("Hello"),
        id => Cow::Owned(format!("Hello {id}")),
    };

    (Status::Ok, text)
}

const fn bad_sequence(text: &'static str) -> Reply {
    (Status::InvalidCommandSequence, Cow::Borrowed(text))
}

impl State {
    /// Apply `command` to the current state, yielding the next state and the
    /// reply to send.
    ///
    /// Out of sequence commands leave the state untouched.
    #[must_use]
    pub fn transition(self, command: Command) -> (Self, Reply) {
        match (self, command) {
            (_, Command::Quit) => (
                Self::Closed,
                (Status::GoodBye, Cow::Borrowed("Bye")),
            ),

            (Self::Init, Command::Helo(variant)) => (Self::Greeted, hello(&variant)),
            (state, Command::Helo(variant)) => (state, hello(&variant)),

            // A new MAIL starts the transaction over, dropping any recipients
            (
                Self::Greeted | Self::HaveSender { .. } | Self::HaveRecipients { .. },
                Command::MailFrom(sender),
            ) => (Self::HaveSender { sender }, ok()),
            (state @ Self::Init, Command::MailFrom(_)) => {
                (state, bad_sequence("Send HELO/EHLO first"))
            }

            (Self::HaveSender { sender }, Command::RcptTo(recipient)) => (
                Self::HaveRecipients {
                    sender,
                    recipients: vec![recipient],
                },
                ok(),
            ),
            (
                Self::HaveRecipients {
                    sender,
                    mut recipients,
                },
                Command::RcptTo(recipient),
            ) => {
                recipients.push(recipient);
                (Self::HaveRecipients { sender, recipients }, ok())
            }
            (state, Command::RcptTo(_)) => (state, bad_sequence("Need MAIL before RCPT")),

            (Self::HaveRecipients { sender, recipients }, Command::Data) => (
                Self::ReadingData { sender, recipients },
                (
                    Status::StartMailInput,
                    Cow::Borrowed("End data with <CR><LF>.<CR><LF>"),
                ),
            ),
            (state, Command::Data) => (state, bad_sequence("Need RCPT before DATA")),

            (state, Command::MailFrom(_)) => (state, bad_sequence("Bad sequence of commands")),
        }
    }

    /// Leave the DATA phase, handing back the envelope collected so far.
    ///
    /// The session returns to [`State::Greeted`] so another message can follow
    /// on the same connection. Returns `None` outside of the DATA phase.
    pub fn take_envelope(&mut self) -> Option<(String, Vec<String>)> {
        match std::mem::replace(self, Self::Greeted) {
            Self::ReadingData { sender, recipients } => Some((sender, recipients)),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Check if this state should close the connection
    #[must_use]
    pub const fn should_close(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if we're in a mail transaction (between MAIL and the end of DATA)
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        matches!(
            self,
            Self::HaveSender { .. } | Self::HaveRecipients { .. } | Self::ReadingData { .. }
        )
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn helo() -> Command {
        Command::Helo(HeloVariant::Helo("client.example.com".to_string()))
    }

    fn mail(sender: &str) -> Command {
        Command::MailFrom(sender.to_string())
    }

    fn rcpt(recipient: &str) -> Command {
        Command::RcptTo(recipient.to_string())
    }

    #[test]
    fn init_to_greeted() {
        let (state, (status, text)) = State::default().transition(helo());

        assert_eq!(state, State::Greeted);
        assert_eq!(status, Status::Ok);
        assert_eq!(text, "Hello client.example.com");
        assert!(!state.in_transaction());
    }

    #[test]
    fn mail_transaction_flow() {
        let (state, _) = State::default().transition(helo());
        let (state, (status, _)) = state.transition(mail("sender@example.com"));
        assert_eq!(status, Status::Ok);
        assert!(state.in_transaction());

        let (state, (status, _)) = state.transition(rcpt("one@example.com"));
        assert_eq!(status, Status::Ok);
        let (state, (status, _)) = state.transition(rcpt("one@example.com"));
        assert_eq!(status, Status::Ok);

        let (mut state, (status, _)) = state.transition(Command::Data);
        assert_eq!(status, Status::StartMailInput);
        assert_eq!(
            state,
            State::ReadingData {
                sender: "sender@example.com".to_string(),
                recipients: vec!["one@example.com".to_string(), "one@example.com".to_string()],
            }
        );

        let envelope = state.take_envelope();
        assert_eq!(
            envelope,
            Some((
                "sender@example.com".to_string(),
                vec!["one@example.com".to_string(), "one@example.com".to_string()]
            ))
        );
        assert_eq!(state, State::Greeted);
        assert_eq!(state.take_envelope(), None);
        assert_eq!(state, State::Greeted);
    }

    #[test]
    fn mail_requires_helo() {
        let (state, (status, _)) = State::default().transition(mail("sender@example.com"));

        assert_eq!(state, State::Init);
        assert_eq!(status, Status::InvalidCommandSequence);
    }

    #[test]
    fn rcpt_requires_mail() {
        let (state, _) = State::default().transition(helo());
        let (state, (status, _)) = state.transition(rcpt("one@example.com"));

        assert_eq!(state, State::Greeted);
        assert_eq!(status, Status::InvalidCommandSequence);
    }

    #[test]
    fn data_requires_recipients() {
        let (state, (status, _)) = State::default().transition(Command::Data);
        assert_eq!(state, State::Init);
        assert_eq!(status, Status::InvalidCommandSequence);

        let (state, _) = State::default().transition(helo());
        let (state, _) = state.transition(mail("sender@example.com"));
        let (state, (status, _)) = state.transition(Command::Data);
        assert!(matches!(state, State::HaveSender { .. }));
        assert_eq!(status, Status::InvalidCommandSequence);
    }

    #[test]
    fn mail_resets_recipients() {
        let (state, _) = State::default().transition(helo());
        let (state, _) = state.transition(mail("first@example.com"));
        let (state, _) = state.transition(rcpt("one@example.com"));
        let (state, (status, _)) = state.transition(mail("second@example.com"));

        assert_eq!(status, Status::Ok);
        assert_eq!(
            state,
            State::HaveSender {
                sender: "second@example.com".to_string()
            }
        );
    }

    #[test]
    fn helo_keeps_transaction() {
        let state = State::HaveSender {
            sender: "sender@example.com".to_string(),
        };
        let (state, (status, text)) =
            state.transition(Command::Helo(HeloVariant::Ehlo(String::new())));

        assert_eq!(status, Status::Ok);
        assert_eq!(text, "Hello");
        assert!(state.in_transaction());
    }

    #[test]
    fn quit_from_any_state() {
        let states = [
            State::Init,
            State::Greeted,
            State::HaveSender {
                sender: "a@b.c".to_string(),
            },
            State::HaveRecipients {
                sender: "a@b.c".to_string(),
                recipients: vec!["d@e.f".to_string()],
            },
        ];

        for state in states {
            let (state, (status, _)) = state.transition(Command::Quit);
            assert_eq!(status, Status::GoodBye);
            assert!(state.should_close());
        }
    }
}
