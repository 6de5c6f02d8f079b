//! Lightning-paywalled HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p ln402-server --release
//!
//! # Run with custom config path
//! cargo run -p ln402-server -- --config /path/to/config.toml
//!
//! # Configure logging level
//! RUST_LOG=debug cargo run -p ln402-server
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `config.toml`)
//! - `HOST` - Override bind address (default: `0.0.0.0`)
//! - `PORT` - Override port (default: `8402`)
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! Variables are also read from a `.env` file in the working directory.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use ln402_http::server::Paywall;
use tracing_subscriber::EnvFilter;

use ln402_server::config::ServerConfig;
use ln402_server::router;

/// Sells API calls for Lightning payments.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    // .env may set RUST_LOG and CONFIG, so load it first
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("Server failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load_from(&cli.config)?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        price = config.invoice.options().price,
        "Loaded configuration"
    );

    let oracle = config.oracle.connect()?;
    tracing::info!(?oracle, "Lightning backend configured");
    let store = config.storage.open()?;
    tracing::info!(storage = ?config.storage, "Record store opened");

    let mut paywall = Paywall::new(oracle, store).with_options(config.invoice.options());
    if let Some(timeout) = config.invoice.timeout() {
        paywall = paywall.with_timeout(timeout);
    }

    let app = router(paywall.layer());

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
