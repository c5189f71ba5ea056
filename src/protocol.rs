//! SMTP command handlers
//!
//! Each handler validates the command against the session state, performs
//! the transition, and writes the reply. Only transport failures are
//! returned as errors; protocol violations are answered and the session
//! carries on.

use tracing::{debug, error, info, warn};

use crate::registry::{Flow, HandlerFuture};
use crate::reply::Reply;
use crate::session::{Session, SessionState};
use crate::utils::{declared_size, extract_mailbox, safe_log_string};

fn greeting_line(hostname: &str, client: &str) -> String {
    if client.is_empty() {
        hostname.to_string()
    } else {
        format!("{} Hello {}", hostname, client)
    }
}

pub fn helo<'a>(session: &'a mut Session, arg: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move {
        session.reset();
        let client = arg.trim();
        debug!("HELO from {}", safe_log_string(client));
        let line = greeting_line(&session.config().hostname, client);
        session.send(&Reply::new(250, line)).await?;
        Ok(Flow::Continue)
    })
}

pub fn ehlo<'a>(session: &'a mut Session, arg: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move {
        session.reset();
        let client = arg.trim();
        debug!("EHLO from {}", safe_log_string(client));

        let config = session.config();
        let mut lines = vec![greeting_line(&config.hostname, client)];
        if !session.is_encrypted() && config.tls_acceptor().is_some() {
            lines.push("STARTTLS".to_string());
        }
        lines.push(format!("SIZE {}", config.max_message_size));

        session.send(&Reply::multiline(250, lines)).await?;
        Ok(Flow::Continue)
    })
}

pub fn mail<'a>(session: &'a mut Session, arg: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move {
        let arg = arg.trim();
        let from = extract_mailbox(arg).to_string();
        if !session.config().sender_allowed(&from) {
            debug!("Rejected reverse-path: {}", safe_log_string(arg));
            session
                .send(&Reply::new(550, format!("bad reverse-path: {}", safe_log_string(arg))))
                .await?;
            return Ok(Flow::Continue);
        }

        let max = session.config().max_message_size;
        if declared_size(arg).is_some_and(|size| size > max) {
            session
                .send(&Reply::new(552, "message exceeds fixed maximum message size"))
                .await?;
            return Ok(Flow::Continue);
        }

        let reply = match session.accept_sender(from.clone()) {
            Ok(()) => Reply::new(250, format!("sender <{}> ok", from)),
            Err(e) => {
                debug!("MAIL refused: {}", e);
                e.reply()
            }
        };
        session.send(&reply).await?;
        Ok(Flow::Continue)
    })
}

pub fn rcpt<'a>(session: &'a mut Session, arg: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move {
        let to = extract_mailbox(arg).to_string();
        if !session.config().accepts_recipient(&to) {
            debug!("Rejected recipient: {}", safe_log_string(&to));
            session
                .send(&Reply::new(550, format!("bad recipient <{}>", to)))
                .await?;
            return Ok(Flow::Continue);
        }

        let reply = match session.accept_recipient(to.clone()) {
            Ok(()) => Reply::new(250, format!("recipient <{}> ok", to)),
            Err(e) => {
                debug!("RCPT refused: {}", e);
                e.reply()
            }
        };
        session.send(&reply).await?;
        Ok(Flow::Continue)
    })
}

pub fn data<'a>(session: &'a mut Session, _arg: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move {
        if session.state() != SessionState::ReadyForData {
            session.send(&Reply::bad_sequence()).await?;
            return Ok(Flow::Continue);
        }

        session
            .send(&Reply::new(354, "Ok send data ending with <CRLF>.<CRLF>"))
            .await?;

        if let Some(rejection) = session.receive_data().await? {
            warn!("Message refused ({}): {}", rejection, session.describe_envelope());
            session.reset();
            session.send(&rejection.reply()).await?;
            return Ok(Flow::Continue);
        }

        match session.deliver().await {
            Ok(()) => {
                info!("Message accepted: {}", session.describe_envelope());
                session.mark_delivered();
                session.send(&Reply::new(250, "Thank You")).await?;
            }
            Err(e) => {
                error!("Failed to store message: {}", e);
                session.reset();
                session.send(&Reply::new(451, "error")).await?;
            }
        }
        Ok(Flow::Continue)
    })
}

pub fn rset<'a>(session: &'a mut Session, _arg: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move {
        session.reset();
        session.send(&Reply::ok()).await?;
        Ok(Flow::Continue)
    })
}

/// VRFY, EXPN and HELP.
pub fn not_implemented<'a>(session: &'a mut Session, _arg: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move {
        session.send(&Reply::not_implemented()).await?;
        Ok(Flow::Continue)
    })
}

pub fn noop<'a>(session: &'a mut Session, _arg: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move {
        session.send(&Reply::ok()).await?;
        Ok(Flow::Continue)
    })
}

pub fn quit<'a>(session: &'a mut Session, _arg: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move {
        session
            .send(&Reply::new(221, "server closing connection"))
            .await?;
        session.close().await?;
        Ok(Flow::Quit)
    })
}

pub fn starttls<'a>(session: &'a mut Session, _arg: &'a str) -> HandlerFuture<'a> {
    Box::pin(async move {
        if session.is_encrypted() {
            session.send(&Reply::new(250, "TLS already active")).await?;
            return Ok(Flow::Continue);
        }
        let Some(acceptor) = session.config().tls_acceptor().cloned() else {
            session.send(&Reply::new(454, "TLS not available")).await?;
            return Ok(Flow::Continue);
        };

        session.send(&Reply::new(220, "TLS ok")).await?;
        if let Err(e) = session.start_tls(&acceptor).await {
            error!("{}", e);
            return Err(e);
        }
        info!("TLS session established");
        Ok(Flow::Continue)
    })
}
