//! Line-oriented reading over a swappable transport

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::SmtpError;
use crate::reply::Reply;

/// Longest accepted line, CRLF included (RFC 5321 text line limit).
pub const MAX_LINE_LENGTH: usize = 1000;

/// A bidirectional byte stream a session can run over: plain TCP, a TLS
/// stream wrapping it, or an in-memory pipe.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedTransport = Box<dyn Transport>;

/// Buffers a transport and yields one line at a time, without its line
/// terminator. Replies are written straight to the transport.
pub struct LineReader {
    inner: BufReader<BoxedTransport>,
    max_line: usize,
}

impl LineReader {
    pub fn new(transport: BoxedTransport) -> Self {
        Self::with_limit(transport, MAX_LINE_LENGTH)
    }

    pub fn with_limit(transport: BoxedTransport, max_line: usize) -> Self {
        Self {
            inner: BufReader::new(transport),
            max_line,
        }
    }

    /// Read the next line. `Ok(None)` means the peer closed the stream.
    ///
    /// A line longer than the limit is drained up to its terminator and
    /// reported as [`SmtpError::LineTooLong`], leaving the reader positioned
    /// at the start of the following line.
    pub async fn read_line(&mut self) -> Result<Option<Vec<u8>>, SmtpError> {
        let mut line = Vec::new();
        let n = (&mut self.inner)
            .take(self.max_line as u64)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            return Ok(None);
        }

        if line.last() != Some(&b'\n') {
            if line.len() < self.max_line {
                // unterminated last line before EOF
                return Ok(Some(line));
            }
            self.discard_rest_of_line().await?;
            return Err(SmtpError::LineTooLong { max: self.max_line });
        }

        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    async fn discard_rest_of_line(&mut self) -> Result<(), SmtpError> {
        loop {
            let buf = self.inner.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }
            let (used, done) = match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (buf.len(), false),
            };
            self.inner.consume(used);
            if done {
                return Ok(());
            }
        }
    }

    pub async fn write_reply(&mut self, reply: &Reply) -> Result<(), SmtpError> {
        let transport = self.inner.get_mut();
        transport.write_all(reply.format().as_bytes()).await?;
        transport.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), SmtpError> {
        self.inner.get_mut().shutdown().await?;
        Ok(())
    }

    /// Number of bytes read from the transport but not yet returned as lines.
    pub fn buffered(&self) -> usize {
        self.inner.buffer().len()
    }

    /// Give back the transport. Buffered bytes are dropped; their count is
    /// returned alongside.
    pub fn into_transport(self) -> (BoxedTransport, usize) {
        let pending = self.buffered();
        (self.inner.into_inner(), pending)
    }
}
