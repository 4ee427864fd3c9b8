//! Foreground service loop
//!
//! Runs after every plugin has started. Logs a heartbeat until the process is
//! asked to stop with SIGINT or SIGTERM.

use std::time::Duration;

use tracing::{debug, info};

use crate::error::{KernelError, Result};

/// Block on the service loop until a shutdown signal arrives
pub fn run(heartbeat: Duration) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| KernelError::io("Failed to start the async runtime", e))?;

    runtime.block_on(serve(heartbeat, shutdown_signal()))
}

/// Heartbeat loop that ends when `shutdown` resolves
pub async fn serve<F>(heartbeat: Duration, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    info!(pid = std::process::id(), "service running");

    let mut ticker = tokio::time::interval(heartbeat);
    // The first tick completes immediately
    ticker.tick().await;
    let mut beats: u64 = 0;

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!(beats, "shutdown requested");
                return Ok(());
            }
            _ = ticker.tick() => {
                beats += 1;
                debug!(beats, "heartbeat");
            }
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())
        .map_err(|e| KernelError::io("Failed to install SIGTERM handler", e))?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| KernelError::io("Failed to listen for SIGINT", e))
        }
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| KernelError::io("Failed to listen for Ctrl+C", e))
}
