use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::SmtpError;
use crate::line_reader::{BoxedTransport, LineReader};
use crate::reply::Reply;
use crate::storage::{Storage, StorageError};
use crate::utils::safe_log_string;

/// Maximum number of recipients per message.
pub const MAX_RECIPIENTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    GotMail,
    GotRcpt,
    ReadyForData,
    DataDone,
    /// Reached from any illegal MAIL/RCPT; left only through a reset.
    BadSequence,
}

/// Per-connection state: the transport, the pending envelope and body, and
/// whether the connection has been upgraded to TLS.
pub struct Session {
    config: Arc<ServerConfig>,
    storage: Arc<dyn Storage>,
    io: Option<LineReader>,
    state: SessionState,
    from: String,
    to: Vec<String>,
    data: Vec<u8>,
    encrypted: bool,
    error_count: usize,
}

impl Session {
    pub fn new(
        config: Arc<ServerConfig>,
        storage: Arc<dyn Storage>,
        transport: BoxedTransport,
    ) -> Self {
        Self {
            config,
            storage,
            io: Some(LineReader::new(transport)),
            state: SessionState::Init,
            from: String::new(),
            to: Vec::new(),
            data: Vec::new(),
            encrypted: false,
            error_count: 0,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sender(&self) -> &str {
        &self.from
    }

    pub fn recipients(&self) -> &[String] {
        &self.to
    }

    pub fn body(&self) -> &[u8] {
        &self.data
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Drop the envelope and body. Transport and encryption are kept.
    pub fn reset(&mut self) {
        self.state = SessionState::Init;
        self.from.clear();
        self.to.clear();
        self.data.clear();
    }

    pub fn accept_sender(&mut self, from: String) -> Result<(), SmtpError> {
        let next = match self.state {
            SessionState::Init => SessionState::GotMail,
            SessionState::GotRcpt => SessionState::ReadyForData,
            _ => {
                self.state = SessionState::BadSequence;
                return Err(SmtpError::BadSequence);
            }
        };
        self.from = from;
        self.state = next;
        Ok(())
    }

    pub fn accept_recipient(&mut self, to: String) -> Result<(), SmtpError> {
        let next = match self.state {
            SessionState::Init | SessionState::GotRcpt => SessionState::GotRcpt,
            SessionState::GotMail | SessionState::ReadyForData => SessionState::ReadyForData,
            SessionState::DataDone | SessionState::BadSequence => {
                self.state = SessionState::BadSequence;
                return Err(SmtpError::BadSequence);
            }
        };
        if self.to.len() >= MAX_RECIPIENTS {
            return Err(SmtpError::TooManyRecipients {
                max: MAX_RECIPIENTS,
            });
        }
        self.to.push(to);
        self.state = next;
        Ok(())
    }

    /// Append one DATA line, undoing dot-stuffing, and add CRLF.
    pub fn append_data_line(&mut self, line: &[u8]) -> Result<(), SmtpError> {
        let line = line.strip_prefix(b".").unwrap_or(line);
        let max = self.config.max_message_size;
        if self.data.len() + line.len() + 2 > max {
            return Err(SmtpError::MessageTooLarge { max });
        }
        self.data.extend_from_slice(line);
        self.data.extend_from_slice(b"\r\n");
        Ok(())
    }

    pub fn mark_delivered(&mut self) {
        self.state = SessionState::DataDone;
    }

    pub fn error_budget_spent(&self) -> bool {
        self.config.max_errors > 0 && self.error_count >= self.config.max_errors
    }

    fn io(&mut self) -> Result<&mut LineReader, SmtpError> {
        self.io.as_mut().ok_or(SmtpError::ConnectionClosed)
    }

    pub async fn send(&mut self, reply: &Reply) -> Result<(), SmtpError> {
        debug!("<< {}", reply.format().trim_end());
        if reply.code() >= 500 {
            self.error_count += 1;
        }
        self.io()?.write_reply(reply).await
    }

    async fn read_line_within(&mut self, deadline: Duration) -> Result<Option<Vec<u8>>, SmtpError> {
        let io = self.io()?;
        timeout(deadline, io.read_line())
            .await
            .map_err(|_| SmtpError::Timeout)?
    }

    /// Next command line, decoded lossily. `Ok(None)` when the peer closed.
    pub async fn read_command(&mut self) -> Result<Option<String>, SmtpError> {
        let deadline = self.config.command_timeout;
        let line = self.read_line_within(deadline).await?;
        Ok(line.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Consume the DATA payload up to the lone `.` line.
    ///
    /// The outer error ends the session. The inner one, when present, is why
    /// the message must be refused (too large, over-long line); the payload
    /// is still read to the end so the session stays in sync.
    pub async fn receive_data(&mut self) -> Result<Option<SmtpError>, SmtpError> {
        let deadline = self.config.data_timeout;
        let mut rejection = None;
        loop {
            let line = match self.read_line_within(deadline).await {
                Ok(Some(line)) => line,
                Ok(None) => return Err(SmtpError::ConnectionClosed),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    rejection.get_or_insert(e);
                    continue;
                }
            };
            if line == b"." {
                break;
            }
            if rejection.is_none() {
                if let Err(e) = self.append_data_line(&line) {
                    rejection = Some(e);
                }
            }
        }
        Ok(rejection)
    }

    /// Hand the current envelope and body to storage.
    pub async fn deliver(&mut self) -> Result<(), StorageError> {
        let storage = Arc::clone(&self.storage);
        storage.save(&self.from, &self.to, &self.data).await
    }

    /// Replace the transport with a TLS stream over it. Bytes the client sent
    /// ahead of the handshake are discarded. The handshake must finish within
    /// the command timeout. On success the envelope is reset and the session
    /// is marked encrypted for good.
    pub async fn start_tls(&mut self, acceptor: &TlsAcceptor) -> Result<(), SmtpError> {
        let reader = self.io.take().ok_or(SmtpError::ConnectionClosed)?;
        let (transport, pending) = reader.into_transport();
        if pending > 0 {
            warn!("Discarding {} bytes sent before the TLS handshake", pending);
        }

        let stream = timeout(self.config.command_timeout, acceptor.accept(transport))
            .await
            .map_err(|_| SmtpError::Timeout)?
            .map_err(SmtpError::TlsHandshake)?;
        self.io = Some(LineReader::new(Box::new(stream)));
        self.reset();
        self.encrypted = true;
        Ok(())
    }

    /// Shut the transport down; later I/O fails with `ConnectionClosed`.
    pub async fn close(&mut self) -> Result<(), SmtpError> {
        if let Some(mut io) = self.io.take() {
            io.shutdown().await?;
        }
        Ok(())
    }

    pub fn describe_envelope(&self) -> String {
        format!(
            "from=<{}> to={:?} bytes={}",
            safe_log_string(&self.from),
            self.to,
            self.data.len()
        )
    }
}
