//! gemgate server binary

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use gemgate_logging::init_subscriber;
use gemgate_server::{run_server, Config, Gem};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "gemgate")]
#[command(about = "Private gem registry in front of rubygems.org")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(long, env = "GEMGATE_CONFIG", default_value = "gemgate.json", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the registry server
    Start {
        /// Host to bind to
        #[arg(long, env = "GEMGATE_HOST")]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, env = "SERVER_PORT")]
        port: Option<u16>,

        /// Data directory for gems and the index snapshot
        #[arg(long, env = "GEMGATE_DATA_DIR")]
        data: Option<PathBuf>,

        /// Upstream registry URL
        #[arg(long, env = "GEMGATE_UPSTREAM")]
        upstream: Option<String>,
    },

    /// Print the metadata gemgate would index for a local .gem file
    Inspect {
        /// Path to the .gem file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Start {
            host,
            port,
            data,
            upstream,
        } => {
            if let Some(host) = host {
                config.server.default_host = host;
            }
            if let Some(port) = port {
                config.server.default_port = port;
            }
            if let Some(data) = data {
                config.storage.default_data_dir = data;
            }
            if let Some(upstream) = upstream {
                config.upstream.url = upstream;
            }

            let _guard = init_subscriber(&config.logging);
            info!(config = %cli.config.display(), "Configuration loaded");
            run_server(config).await
        }

        Commands::Inspect { file } => {
            let raw = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let gem = Gem::load(Bytes::from(raw))
                .with_context(|| format!("{} is not a valid gem", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&gem.metadata)?);
            Ok(())
        }
    }
}
