//! Wait for SIGINT or SIGTERM.

use anyhow::Result;

/// Resolve once the process is asked to stop.
///
/// Signal handlers are installed on first poll, so create the future before
/// entering a `select!` loop and poll it by reference.
pub async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl-C");
    }

    Ok(())
}
