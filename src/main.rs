//! Shadow proxy
//!
//! Mirrors every inbound request to a primary and a secondary backend.
//!
//! ```text
//!                        ┌──────────────────────────────────────────┐
//!     Client Request     │  ┌────────┐    ┌──────────────┐          │      ┌──────────┐
//!     ───────────────────┼─▶│  http  │───▶│ orchestrator │──────────┼─────▶│ primary  │
//!                        │  │ server │    │   (fork)     │──┐       │      └──────────┘
//!                        │  └────────┘    └──────┬───────┘  │       │      ┌──────────┐
//!     Client Response    │      ▲                │          └───────┼─────▶│secondary │
//!     ◀──────────────────┼──────┘         primary outcome           │      └──────────┘
//!                        │                       │                  │
//!                        │                ┌──────▼───────┐          │
//!                        │                │  comparator  │ (detached)
//!                        │                └──────────────┘          │
//!                        └──────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use shadow_proxy::config::loader;
use shadow_proxy::lifecycle::{signals, Shutdown};
use shadow_proxy::observability::{logging, metrics};
use shadow_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "shadow-proxy")]
#[command(about = "Reverse proxy that mirrors traffic to a secondary backend", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port, overrides config and environment
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = loader::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.listener.port = port;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("shadow-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        environment = %config.environment,
        bind_address = %config.listener.bind_address(),
        primary = %config.backends.primary_url,
        secondary = %config.backends.secondary_url,
        call_timeout_ms = config.backends.call_timeout_ms,
        comparison_timeout_ms = config.timeouts.comparison_timeout().as_millis() as u64,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(error) => {
                tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    error = %error,
                    "Failed to parse metrics address"
                );
            }
        }
    }

    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    let shutdown = Shutdown::new();
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => {
            result??;
        }
        signal = signals::shutdown_signal() => {
            let name = signal?;
            tracing::info!(signal = name, "Received shutdown signal");
            shutdown.trigger();
            server_task.await??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
