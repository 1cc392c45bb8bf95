//! Shared-cab ride matcher service.
//!
//! # Architecture Overview
//!
//! ```text
//!    Rider (WebSocket)                                    Cab (HTTP)
//!          │                                                  │
//!          ▼                                                  ▼
//!   ┌─────────────┐  presence / poll   ┌──────────────┐  heartbeat
//!   │   session   │───────────────────▶│   GeoStore   │◀───────────
//!   │ state mach. │                    │ (redis / mem)│
//!   └──────┬──────┘                    └──────▲───────┘
//!          │ RideJob                          │ atomic assign / create
//!          ▼                                  │
//!   ┌─────────────┐   delivery   ┌────────────┴─────┐
//!   │  JobQueue   │─────────────▶│ dispatcher + N   │
//!   │             │◀─ack / nack──│ matching workers │
//!   └─────────────┘              └──────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use ride_matcher::config::{load_config, MatcherConfig};
use ride_matcher::lifecycle::{build_services, wait_for_signal, Shutdown};
use ride_matcher::observability::{logging, metrics};
use ride_matcher::HttpServer;

#[derive(Parser)]
#[command(name = "ride-matcher")]
#[command(about = "Real-time shared-cab ride matcher", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => MatcherConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!("ride-matcher v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        workers = config.workers.count,
        match_queue = %config.queue.match_queue,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = build_services(&config).await?;
    let shutdown = Shutdown::new();

    let pool = services.worker_pool(&config);
    let pool_task = tokio::spawn(pool.run(shutdown.subscribe()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(&config, services.app_state(&config));
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();

    server_task.await??;
    pool_task.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
