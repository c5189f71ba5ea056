//! A receiving SMTP server.
//!
//! Clients deliver mail for a configured set of domains; accepted messages
//! are handed to a [`Storage`] backend. Plain connections can be upgraded
//! with STARTTLS when a certificate is configured.
//!
//! ```no_run
//! use std::sync::Arc;
//! use smtpd::{MaildirStorage, ServerConfig, SmtpServer};
//!
//! # async fn start() -> anyhow::Result<()> {
//! let config = ServerConfig::new("0.0.0.0:2525", "mx.example.com").with_domains(["example.com"]);
//! let storage = Arc::new(MaildirStorage::new("/var/mail/inbound", "mx.example.com"));
//! SmtpServer::new(config, storage).run().await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod line_reader;
pub mod protocol;
pub mod registry;
pub mod reply;
pub mod server;
pub mod session;
pub mod storage;
pub mod tls;
pub mod utils;

pub use config::ServerConfig;
pub use error::SmtpError;
pub use registry::{CommandRegistry, Flow, Handler, HandlerFuture};
pub use reply::Reply;
pub use server::{run_session, SmtpServer};
pub use session::{Session, SessionState};
pub use storage::{ChannelStorage, MaildirStorage, ReceivedMessage, Storage, StorageError};
