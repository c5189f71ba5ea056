use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::{Storage, StorageError};

/// A message handed over by [`ChannelStorage`].
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub from: String,
    pub to: Vec<String>,
    pub data: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl ReceivedMessage {
    /// Value of the first `Subject:` header, if any.
    pub fn subject(&self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.data);
        for line in text.lines() {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("subject") {
                    return Some(value.trim().to_string());
                }
            }
        }
        None
    }
}

/// Sends every accepted message down an unbounded channel. Useful when the
/// server is embedded in another program or a test.
#[derive(Debug, Clone)]
pub struct ChannelStorage {
    sender: mpsc::UnboundedSender<ReceivedMessage>,
}

impl ChannelStorage {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ReceivedMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Storage for ChannelStorage {
    async fn save(&self, from: &str, to: &[String], message: &[u8]) -> Result<(), StorageError> {
        let message = ReceivedMessage {
            from: from.to_string(),
            to: to.to_vec(),
            data: message.to_vec(),
            received_at: Utc::now(),
        };
        self.sender
            .send(message)
            .map_err(|_| StorageError::Unavailable("receiver dropped".to_string()))
    }
}
