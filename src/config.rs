//! Server configuration shared read-only by every session

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tokio_rustls::TlsAcceptor;

use crate::tls;
use crate::utils::domain_matches;

/// Advertised and enforced maximum message size, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 35_882_577;
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(600);
/// Number of 5xx replies after which a session is closed.
pub const DEFAULT_MAX_ERRORS: usize = 10;

#[derive(Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub hostname: String,
    pub greeting: String,
    /// Domains this server accepts mail for.
    pub domains: Vec<String>,
    pub max_message_size: usize,
    pub allow_null_sender: bool,
    pub command_timeout: Duration,
    pub data_timeout: Duration,
    pub max_errors: usize,
    tls: Option<TlsAcceptor>,
}

impl ServerConfig {
    pub fn new(listen_addr: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            hostname: hostname.into(),
            greeting: "ESMTP smtpd".to_string(),
            domains: Vec::new(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            allow_null_sender: false,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            data_timeout: DEFAULT_DATA_TIMEOUT,
            max_errors: DEFAULT_MAX_ERRORS,
            tls: None,
        }
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    pub fn with_null_sender(mut self, allowed: bool) -> Self {
        self.allow_null_sender = allowed;
        self
    }

    pub fn with_timeouts(mut self, command: Duration, data: Duration) -> Self {
        self.command_timeout = command;
        self.data_timeout = data;
        self
    }

    pub fn with_max_errors(mut self, max: usize) -> Self {
        self.max_errors = max;
        self
    }

    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Load certificate and key from PEM files. Fails if either cannot be
    /// read or parsed.
    pub fn with_tls_files(self, cert_path: &Path, key_path: &Path) -> Result<Self> {
        let acceptor = tls::load_acceptor(cert_path, key_path)?;
        Ok(self.with_tls(acceptor))
    }

    pub fn tls_acceptor(&self) -> Option<&TlsAcceptor> {
        self.tls.as_ref()
    }

    pub fn sender_allowed(&self, from: &str) -> bool {
        self.allow_null_sender || !from.is_empty()
    }

    pub fn accepts_recipient(&self, to: &str) -> bool {
        self.domains.iter().any(|domain| domain_matches(to, domain))
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen_addr", &self.listen_addr)
            .field("hostname", &self.hostname)
            .field("greeting", &self.greeting)
            .field("domains", &self.domains)
            .field("max_message_size", &self.max_message_size)
            .field("allow_null_sender", &self.allow_null_sender)
            .field("command_timeout", &self.command_timeout)
            .field("data_timeout", &self.data_timeout)
            .field("max_errors", &self.max_errors)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}
