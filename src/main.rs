mod daemon;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use structopt::StructOpt;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::time::ChronoLocal;

use smtpd::config::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_DATA_TIMEOUT, DEFAULT_MAX_ERRORS, DEFAULT_MAX_MESSAGE_SIZE,
};
use smtpd::{MaildirStorage, ServerConfig, SmtpServer};

#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "smtpd",
    about = "A receiving SMTP server with STARTTLS and Maildir delivery"
)]
pub struct Opt {
    /// Listening address
    #[structopt(short = "l", long = "listen", default_value = "0.0.0.0:25")]
    pub listen: String,

    /// Host name used in the banner and replies
    #[structopt(long = "hostname", default_value = "localhost")]
    pub hostname: String,

    /// Text following the host name in the 220 banner
    #[structopt(long = "greeting", default_value = "ESMTP smtpd")]
    pub greeting: String,

    /// Domain(s) to accept mail for (can be specified multiple times, required)
    #[structopt(long = "domain", required = true, number_of_values = 1)]
    pub domains: Vec<String>,

    /// TLS certificate file (PEM), enables STARTTLS
    #[structopt(long = "tls-cert", parse(from_os_str))]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key file (PEM)
    #[structopt(long = "tls-key", parse(from_os_str))]
    pub tls_key: Option<PathBuf>,

    /// Maildir that receives accepted messages
    #[structopt(long = "maildir", parse(from_os_str))]
    pub maildir: PathBuf,

    /// Maximum message size in bytes
    #[structopt(long = "max-size")]
    pub max_size: Option<usize>,

    /// Accept the null reverse-path (MAIL FROM:<>)
    #[structopt(long = "allow-null-sender")]
    pub allow_null_sender: bool,

    /// Seconds to wait for a command
    #[structopt(long = "command-timeout")]
    pub command_timeout: Option<u64>,

    /// Seconds to wait for each line of message data
    #[structopt(long = "data-timeout")]
    pub data_timeout: Option<u64>,

    /// Number of 5xx replies before a client is disconnected (0 disables)
    #[structopt(long = "max-errors")]
    pub max_errors: Option<usize>,

    /// Log file path
    #[structopt(long = "logs", parse(from_os_str))]
    pub log_file: Option<PathBuf>,

    /// Verbose mode - log every command and reply
    #[structopt(short = "v", long = "verbose")]
    pub verbose: bool,

    /// Run as daemon
    #[structopt(short = "d", long = "daemon")]
    pub daemon: bool,

    /// Pid file written in daemon mode
    #[structopt(long = "pid-file", parse(from_os_str), default_value = "/tmp/smtpd.pid")]
    pub pid_file: PathBuf,
}

fn init_logging(opt: &Opt) -> Result<()> {
    let level = if opt.verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()));

    match &opt.log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory: {:?}", parent))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {:?}", path))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn build_config(opt: &Opt) -> Result<ServerConfig> {
    let mut config = ServerConfig::new(opt.listen.clone(), opt.hostname.clone())
        .with_greeting(opt.greeting.clone())
        .with_domains(opt.domains.iter().map(|d| d.to_ascii_lowercase()))
        .with_max_message_size(opt.max_size.unwrap_or(DEFAULT_MAX_MESSAGE_SIZE))
        .with_null_sender(opt.allow_null_sender)
        .with_timeouts(
            opt.command_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
            opt.data_timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DATA_TIMEOUT),
        )
        .with_max_errors(opt.max_errors.unwrap_or(DEFAULT_MAX_ERRORS));

    match (&opt.tls_cert, &opt.tls_key) {
        (Some(cert), Some(key)) => config = config.with_tls_files(cert, key)?,
        (None, None) => info!("No certificate configured, STARTTLS disabled"),
        _ => return Err(anyhow!("--tls-cert and --tls-key must be given together")),
    }
    Ok(config)
}

fn main() -> Result<()> {
    let opt = Opt::from_args();
    init_logging(&opt)?;

    info!("smtpd v{} starting (PID {})", env!("CARGO_PKG_VERSION"), std::process::id());

    let config = match build_config(&opt) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return Err(e);
        }
    };
    info!("Accepting mail for {:?}", config.domains);

    std::fs::create_dir_all(&opt.maildir)
        .with_context(|| format!("Failed to create maildir: {:?}", opt.maildir))?;

    // fork before any runtime thread exists
    if opt.daemon {
        daemon::daemonize(&opt.pid_file)?;
    }

    let storage = Arc::new(MaildirStorage::new(opt.maildir.clone(), config.hostname.clone()));
    let server = SmtpServer::new(config, storage);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start the async runtime")?;
    runtime.block_on(async move {
        if let Err(e) = server.run().await {
            error!("Server error: {:#}", e);
            return Err(e);
        }
        Ok(())
    })
}
