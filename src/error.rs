//! Session-level error types

use thiserror::Error;

use crate::reply::Reply;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(#[source] std::io::Error),

    #[error("Timed out waiting for the client")]
    Timeout,

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Command not recognized: {0}")]
    UnrecognizedCommand(String),

    #[error("Command out of sequence")]
    BadSequence,

    #[error("Line too long (max {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Too many recipients (max {max})")]
    TooManyRecipients { max: usize },

    #[error("Message too large (max {max} bytes)")]
    MessageTooLarge { max: usize },
}

impl SmtpError {
    /// Fatal errors end the session; everything else is answered and the
    /// session keeps reading commands.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SmtpError::Io(_)
                | SmtpError::TlsHandshake(_)
                | SmtpError::Timeout
                | SmtpError::ConnectionClosed
        )
    }

    /// The reply reported to the peer for this error.
    pub fn reply(&self) -> Reply {
        match self {
            SmtpError::Io(_) | SmtpError::TlsHandshake(_) | SmtpError::ConnectionClosed => {
                Reply::new(421, "service not available, closing connection")
            }
            SmtpError::Timeout => Reply::new(421, "timeout, closing connection"),
            SmtpError::UnrecognizedCommand(_) => Reply::new(500, "command not recognized"),
            SmtpError::BadSequence => Reply::bad_sequence(),
            SmtpError::LineTooLong { .. } => Reply::new(500, "line too long"),
            SmtpError::TooManyRecipients { .. } => Reply::new(452, "too many recipients"),
            SmtpError::MessageTooLarge { .. } => {
                Reply::new(552, "message exceeds fixed maximum message size")
            }
        }
    }
}
