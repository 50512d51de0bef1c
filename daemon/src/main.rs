//! TomChain server daemon — entry point for running a consensus server.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use tomchain_node::{ServerConfig, TomchainServer};

#[derive(Parser)]
#[command(name = "tc-server", about = "TomChain consensus server")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long = "cf", value_name = "PATH")]
    config_file: PathBuf,

    /// Server id, overriding the config file's `server-id`.
    #[arg(long = "id", value_name = "UINT")]
    id: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::from_json_file(&cli.config_file)
        .with_context(|| format!("loading config {}", cli.config_file.display()))?;
    if let Some(id) = cli.id {
        config.server_id = id;
    }

    tomchain_utils::init_tracing(&config.log_level);
    tracing::info!(
        server_id = config.server_id,
        server_count = config.server_count,
        client_count = config.client_count,
        "TomChain server starting"
    );

    let mut server = TomchainServer::new(config).context("server initialization failed")?;
    server.start().await.context("server startup failed")?;

    server.wait_for_shutdown().await;
    server.stop().await;

    tracing::info!("tc-server exited cleanly");
    Ok(())
}
