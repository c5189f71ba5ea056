//! Command keyword → handler mapping

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::error::SmtpError;
use crate::protocol;
use crate::session::Session;

/// What the session loop does after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Flow, SmtpError>> + Send + 'a>>;

/// A command handler gets the session and the text following the keyword.
pub type Handler = for<'a> fn(&'a mut Session, &'a str) -> HandlerFuture<'a>;

/// Built once before the first connection and shared read-only afterwards.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Handler>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command this server understands.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("helo", protocol::helo);
        registry.register("ehlo", protocol::ehlo);
        registry.register("mail", protocol::mail);
        registry.register("rcpt", protocol::rcpt);
        registry.register("data", protocol::data);
        registry.register("rset", protocol::rset);
        registry.register("vrfy", protocol::not_implemented);
        registry.register("expn", protocol::not_implemented);
        registry.register("help", protocol::not_implemented);
        registry.register("noop", protocol::noop);
        registry.register("quit", protocol::quit);
        registry.register("starttls", protocol::starttls);
        registry
    }

    /// Install `handler` for `keyword` (case-insensitive), returning the
    /// handler it replaces.
    pub fn register(&mut self, keyword: &str, handler: Handler) -> Option<Handler> {
        self.handlers.insert(keyword.to_ascii_lowercase(), handler)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.handlers.contains_key(&keyword.to_ascii_lowercase())
    }

    /// Find the handler for a command line and the argument text after its
    /// keyword. A keyword must be followed by whitespace or the end of the
    /// line; when several match, the longest wins.
    pub fn resolve<'l>(&self, line: &'l str) -> Result<(Handler, &'l str), SmtpError> {
        let lower = line.to_ascii_lowercase();
        self.handlers
            .iter()
            .filter(|(keyword, _)| {
                lower.starts_with(keyword.as_str())
                    && lower[keyword.len()..]
                        .chars()
                        .next()
                        .map_or(true, char::is_whitespace)
            })
            .max_by_key(|(keyword, _)| keyword.len())
            .map(|(keyword, handler)| (*handler, &line[keyword.len()..]))
            .ok_or_else(|| SmtpError::UnrecognizedCommand(line.to_string()))
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keywords: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        keywords.sort_unstable();
        f.debug_struct("CommandRegistry")
            .field("keywords", &keywords)
            .finish()
    }
}
