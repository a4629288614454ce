use anyhow::{Context, Result};
use dynmount_core::Daemon;
use std::path::Path;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

/// How often watchers that gave up are restarted.
const WATCHER_REVIVE_INTERVAL: Duration = Duration::from_secs(60);

pub async fn execute(config: &Path) -> Result<bool> {
    super::require_root("daemon")?;

    let mut daemon = Daemon::start(config)
        .await
        .with_context(|| format!("Failed to start daemon from {}", config.display()))?;
    info!("dynmount daemon v{} running", env!("CARGO_PKG_VERSION"));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut revive = tokio::time::interval(WATCHER_REVIVE_INTERVAL);
    revive.tick().await;

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = revive.tick() => daemon.revive_watchers(),
        }
    }

    daemon.shutdown().await;
    info!("dynmount daemon stopped");
    Ok(true)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
