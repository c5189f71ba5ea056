use std::path::Path;

/// Detach from the terminal, writing our pid to `pid_file`. Must run before
/// the async runtime starts any threads.
#[cfg(unix)]
pub fn daemonize(pid_file: &Path) -> anyhow::Result<()> {
    use anyhow::Context;
    use daemonize::Daemonize;
    use tracing::info;

    let cwd = std::env::current_dir().context("Cannot determine working directory")?;
    info!("Starting daemon mode (pid file {:?})", pid_file);

    Daemonize::new()
        .pid_file(pid_file)
        .chown_pid_file(true)
        .working_directory(cwd)
        .umask(0o027)
        .start()
        .map_err(|e| anyhow::anyhow!("Failed to start daemon mode: {}", e))?;

    info!("Daemon started with PID {}", std::process::id());
    Ok(())
}

#[cfg(not(unix))]
pub fn daemonize(_pid_file: &Path) -> anyhow::Result<()> {
    tracing::warn!("Daemon mode not supported on this platform, staying in foreground");
    Ok(())
}
