//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT/SIGTERM and trigger graceful shutdown
//! - Turn SIGHUP into a configuration reload
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP reloads, never shuts down
//! - Non-unix targets only get Ctrl-C

use crate::config::ConfigReloader;
use crate::lifecycle::Shutdown;

/// Resolve once Ctrl-C or SIGTERM arrives.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Trigger `shutdown` on the first termination signal.
pub fn spawn_shutdown_listener(shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Termination signal received, shutting down");
        shutdown.trigger();
    })
}

/// Reload the configuration on every SIGHUP until `shutdown` fires.
#[cfg(unix)]
pub fn spawn_reload_listener(reloader: ConfigReloader, shutdown: &Shutdown) -> tokio::task::JoinHandle<()> {
    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        let mut hangup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGHUP");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = stop.recv() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    tracing::info!(path = ?reloader.path(), "SIGHUP received, reloading configuration");
                    reloader.reload();
                }
            }
        }
    })
}

#[cfg(not(unix))]
pub fn spawn_reload_listener(_reloader: ConfigReloader, _shutdown: &Shutdown) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async {})
}
