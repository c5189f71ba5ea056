//! Message storage backends

mod channel;
mod maildir;

use async_trait::async_trait;
use thiserror::Error;

pub use channel::{ChannelStorage, ReceivedMessage};
pub use maildir::MaildirStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Destination for accepted messages.
///
/// `save` is called once per completed DATA exchange with the envelope and
/// the raw message bytes. A failure is reported to the client as a transient
/// error and the message is not retried.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save(&self, from: &str, to: &[String], message: &[u8]) -> Result<(), StorageError>;
}
