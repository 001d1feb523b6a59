//! API gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ http server ─▶ route table ─▶ rate limit ─▶ cache ─▶ resolver
//!                                       │                                   │
//!                                       │ aggregate                         ▼
//!                                       └─▶ fan-out (N × pipeline)     load balancer
//!                                                                           │
//!     Client Response                                                       ▼
//!     ◀───────────── response transform ◀─ cache store ◀─ QoS guard (breaker + timeout)
//!                                                              │
//!                                                              ▼
//!                                                       downstream service
//! ```
//!
//! Configuration is reloaded on file change (`--watch`) and on SIGHUP; a
//! rejected configuration never replaces the running one.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::{load_config, ConfigWatcher};
use api_gateway::lifecycle::signals;
use api_gateway::observability::{logging, metrics};
use api_gateway::{Gateway, HttpServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "api-gateway", version, about = "API gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Reload the configuration whenever the file changes.
    #[arg(long)]
    watch: bool,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");
    tracing::info!(
        path = ?args.config,
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        aggregates = config.aggregates.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let max_body_bytes = config.listener.max_body_bytes;
    let bind_address = config.listener.bind_address.clone();
    let gateway = Arc::new(Gateway::new(config)?);

    let shutdown = Shutdown::new();
    let (watcher, config_updates) = ConfigWatcher::new(&args.config);
    signals::spawn_reload_listener(watcher.reloader(), &shutdown);
    let _file_watch = if args.watch {
        Some(watcher.run()?)
    } else {
        drop(watcher);
        None
    };
    signals::spawn_shutdown_listener(shutdown.clone());

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    HttpServer::new(gateway, max_body_bytes)
        .run(listener, config_updates, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
