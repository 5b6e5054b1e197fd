// Numan Thabit 2025
// crates/fling-server/src/bin/fling_server.rs
use anyhow::Result;
use clap::Parser;
use fling_server::config::{ServerArgs, ServerConfig};
use fling_server::launch_server;
use fling_server::telemetry::init_tracing;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();
    init_tracing();

    let config = ServerConfig::from_cli(&args)?;
    let handle = launch_server(config).await?;
    info!(addr = %handle.local_addr(), "fling-server started");
    let _ = signal::ctrl_c().await;
    handle.shutdown().await?;
    Ok(())
}
