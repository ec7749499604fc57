//! parley — WebSocket chat relay binary.
//!
//! Wires the store and server together: open the message database, start
//! the relay, run until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use parley_store::Database;

/// Chat relay server.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "WebSocket chat relay server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Path to the SQLite message database.
    #[arg(long, default_value = "./chat.db")]
    db_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();

    let db = Database::open(&args.db_path).context("failed to open database")?;

    let config = parley_server::ServerConfig {
        host: args.host,
        port: args.port,
        ..parley_server::ServerConfig::default()
    };
    let handle = parley_server::start(config, db)
        .await
        .context("failed to start server")?;
    tracing::info!(port = handle.port, "chat relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;
    tracing::info!("shutting down");
    Ok(())
}
