//! Waypoint CLI: the main entry point.
//!
//! Commands:
//! - `chat`          - Interactive chat; interrupts are answered in the terminal
//! - `resume`        - Answer the pending interrupt of a conversation
//! - `serve`         - Start the HTTP gateway
//! - `conversations` - List stored conversations
//! - `show`          - Print one conversation
//! - `config`        - Print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "waypoint",
    about = "Waypoint — resumable human-in-the-loop tool-use runs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.waypoint/config.toml)
    #[arg(long, global = true, env = "WAYPOINT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat {
        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Answer a suspended conversation's interrupt
    Resume {
        /// Conversation to resume
        #[arg(short, long)]
        conversation: String,

        /// `confirm`, `cancel`, a candidate number, or JSON such as
        /// `{"params": {"date": "2025-05-01"}}`
        value: String,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List stored conversations
    Conversations,

    /// Show one conversation's state and messages
    Show {
        /// Conversation id
        id: String,
    },

    /// Print the effective configuration
    Config {
        /// Only print the config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Chat {
            conversation,
            message,
        } => commands::chat::run(config_path, conversation, message).await?,
        Commands::Resume {
            conversation,
            value,
        } => commands::resume::run(config_path, conversation, &value).await?,
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Conversations => commands::inspect::list(config_path).await?,
        Commands::Show { id } => commands::inspect::show(config_path, id).await?,
        Commands::Config { path } => commands::config_cmd::run(config_path, path)?,
    }

    Ok(())
}
