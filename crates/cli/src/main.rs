//! parley CLI - the main entry point.
//!
//! Commands:
//! - `serve`   - Start the HTTP/WebSocket gateway
//! - `chat`    - Interactive chat or single-message mode
//! - `tools`   - List, describe, or run registered tools
//! - `status`  - Show configuration and provider status

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use parley_config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "parley - conversational orchestration for LLM chat",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.parley/config.toml
    #[arg(short, long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List tools, describe one, or run it with JSON arguments
    Tools {
        /// Tool to describe or run
        name: Option<String>,

        /// JSON object of arguments; runs the tool
        #[arg(short, long)]
        args: Option<String>,
    },

    /// Show configuration and provider status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => AppConfig::load_with_env(path)?,
        None => AppConfig::load()?,
    };
    let config = AppConfig::install_global(loaded);

    // Initialize tracing
    let filter = if cli.verbose || config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config.clone(), port).await?,
        Commands::Chat { message } => commands::chat::run(config, message).await?,
        Commands::Tools { name, args } => commands::tools::run(config, name, args).await?,
        Commands::Status => commands::status::run(config).await?,
    }

    Ok(())
}
