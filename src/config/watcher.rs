//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Loads the configuration file and forwards it when it validates.
/// Shared by the file watcher and SIGHUP.
#[derive(Debug, Clone)]
pub struct ConfigReloader {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigReloader {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns false if the file was rejected or nobody is listening.
    pub fn reload(&self) -> bool {
        match load_config(&self.path) {
            Ok(config) => self.update_tx.send(config).is_ok(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                crate::observability::metrics::record_config_reload(false);
                false
            }
        }
    }
}

/// Monitors the configuration file and forwards every config that loads and validates.
pub struct ConfigWatcher {
    reloader: ConfigReloader,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let reloader = ConfigReloader {
            path: path.to_path_buf(),
            update_tx,
        };
        (Self { reloader }, update_rx)
    }

    /// Handle that other reload triggers (SIGHUP) share.
    pub fn reloader(&self) -> ConfigReloader {
        self.reloader.clone()
    }

    /// Load the file now and forward it. Returns false if it was rejected.
    pub fn reload_now(&self) -> bool {
        self.reloader.reload()
    }

    /// Start watching the file. Dropping the returned watcher stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let reloader = self.reloader.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?reloader.path(), "Config file change detected, reloading");
                        reloader.reload();
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(self.reloader.path(), RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.reloader.path(), "Config watcher started");
        Ok(watcher)
    }
}
