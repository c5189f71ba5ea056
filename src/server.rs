use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::error::SmtpError;
use crate::registry::{CommandRegistry, Flow};
use crate::reply::Reply;
use crate::session::Session;
use crate::storage::Storage;
use crate::utils::safe_log_string;

/// Accepts connections and runs one session task per client.
#[derive(Clone)]
pub struct SmtpServer {
    config: Arc<ServerConfig>,
    storage: Arc<dyn Storage>,
    commands: Arc<CommandRegistry>,
}

impl SmtpServer {
    pub fn new(config: ServerConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            commands: Arc::new(CommandRegistry::standard()),
        }
    }

    /// Replace the command set. Must be done before serving.
    pub fn with_commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = Arc::new(commands);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<()> {
        let addr = &self.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until accepting
    /// fails for good.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("Listener has no local address")?;
        info!(
            "Listening on {} as {} (TLS {})",
            local,
            self.config.hostname,
            if self.config.tls_acceptor().is_some() { "available" } else { "disabled" }
        );

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let this = self.clone();
                    tokio::spawn(
                        async move { this.handle_client(stream).await }
                            .instrument(info_span!("session", %peer)),
                    );
                }
                Err(e) => {
                    warn!("Accept error: {}", e);
                }
            }
        }
    }

    async fn handle_client(&self, stream: TcpStream) {
        info!("New connection");
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Cannot set TCP_NODELAY: {}", e);
        }

        let mut session = Session::new(
            Arc::clone(&self.config),
            Arc::clone(&self.storage),
            Box::new(stream),
        );
        match run_session(&mut session, &self.commands).await {
            Ok(()) => info!("Connection closed"),
            Err(e) => error!("Session ended: {}", e),
        }
    }
}

/// Drive one session: greet, then read and dispatch commands until the
/// client quits or disconnects, a timeout fires, the error budget runs out
/// or the transport fails.
pub async fn run_session(
    session: &mut Session,
    commands: &CommandRegistry,
) -> Result<(), SmtpError> {
    let banner = {
        let config = session.config();
        format!("{} {}", config.hostname, config.greeting)
    };
    session.send(&Reply::new(220, banner)).await?;

    loop {
        if session.error_budget_spent() {
            warn!("Too many errors ({}), closing", session.error_count());
            session
                .send(&Reply::new(421, "too many errors, closing connection"))
                .await?;
            return session.close().await;
        }

        let line = match session.read_command().await {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(SmtpError::Timeout) => return timed_out(session).await,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("Rejected line: {}", e);
                session.send(&e.reply()).await?;
                continue;
            }
        };
        debug!(">> {}", safe_log_string(&line));

        let (handler, arg) = match commands.resolve(&line) {
            Ok(found) => found,
            Err(e) => {
                session.send(&e.reply()).await?;
                continue;
            }
        };
        match handler(session, arg).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => return Ok(()),
            Err(SmtpError::Timeout) => return timed_out(session).await,
            Err(e) => return Err(e),
        }
    }
}

async fn timed_out(session: &mut Session) -> Result<(), SmtpError> {
    info!("Client timed out");
    // the peer may be gone already
    let _ = session.send(&SmtpError::Timeout.reply()).await;
    let _ = session.close().await;
    Ok(())
}
