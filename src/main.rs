//! portmux host binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────┐
//!                  │                     PORTMUX                      │
//!   Client         │  ┌────────┐   ┌─────────┐   ┌─────┐   ┌──────┐  │
//!   ───────────────┼─▶│ binder │──▶│ sniffer │──▶│ TLS │──▶│ gzip │  │
//!                  │  │listener│   └────┬────┘   └─────┘   └──┬───┘  │
//!                  │  └────────┘        ▼                     ▼      │
//!                  │              ┌────────────────────────────────┐ │
//!                  │              │ HTTP chain (axum + tower-http) │ │
//!                  │              │   codec → json reader          │ │
//!                  │              └────────────────────────────────┘ │
//!                  │   registry · config · observability · lifecycle  │
//!                  └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use portmux::config::{load_config, PortmuxConfig};
use portmux::http::demo_routes;
use portmux::lifecycle::{wait_for_signal, Shutdown};
use portmux::observability::logging;
use portmux::Server;

#[derive(Debug, Parser)]
#[command(name = "portmux", version, about = "Single-port HTTP/TLS/gzip front-end")]
struct Cli {
    /// TOML configuration file; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init();

    tracing::info!("portmux v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PortmuxConfig::default(),
    };

    tracing::info!(
        host = %config.listener.host,
        first_port = config.listener.first_port,
        port_count = config.listener.port_count,
        max_connections = config.listener.max_connections,
        tls = config.tls.is_some(),
        "Configuration loaded"
    );

    let server = Server::bind(&config, demo_routes()).await?;
    println!("{}", server.port());

    let shutdown = Shutdown::new();
    let serving = tokio::spawn(server.run(shutdown.subscribe()));

    wait_for_signal().await;
    shutdown.trigger();
    serving.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
