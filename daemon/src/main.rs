//! Attendance daemon: entry point for running a presence node.

use anyhow::Context;
use clap::Parser;
use presence_node::{init_logging, NodeConfig, PresenceNode, StoreBackend};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "presence-daemon", about = "Attendance verification node")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base; flags
    /// and environment variables override them.
    #[arg(long, env = "PRESENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for LMDB storage.
    #[arg(long, env = "PRESENCE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Storage backend: "lmdb" or "memory".
    #[arg(long, env = "PRESENCE_BACKEND")]
    backend: Option<StoreBackend>,

    /// HTTP API port.
    #[arg(long, env = "PRESENCE_RPC_PORT")]
    rpc_port: Option<u16>,

    /// Enable the WebSocket notification server.
    #[arg(long, env = "PRESENCE_ENABLE_WEBSOCKET")]
    websocket: bool,

    /// WebSocket server port.
    #[arg(long, env = "PRESENCE_WS_PORT")]
    websocket_port: Option<u16>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "PRESENCE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "PRESENCE_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the node.
    Run,
    /// Print the effective configuration as TOML and exit.
    Config,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<(NodeConfig, Command)> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if self.websocket {
            config.enable_websocket = true;
        }
        if let Some(port) = self.websocket_port {
            config.websocket_port = port;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        Ok((config, self.command))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, command) = Cli::parse().into_config()?;

    match command {
        Command::Config => {
            println!("{}", config.to_toml_string()?);
        }
        Command::Run => {
            init_logging(config.log_format()?, &config.log_level)?;
            tracing::info!(
                backend = %config.backend,
                data_dir = %config.data_dir.display(),
                rpc_port = config.rpc_port,
                "starting presence node"
            );

            let node = PresenceNode::new(config).context("starting node")?;
            node.run().await?;

            tracing::info!("presence daemon exited cleanly");
        }
    }

    Ok(())
}
