//! MoltyClaw CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Interactive console with live streaming
//! - `ask`     — Send a single message and print the reply
//! - `config`  — Print a starter config or validate the current one

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "moltyclaw",
    about = "MoltyClaw — a conversational agent that acts through tools",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent interactively
    Chat,

    /// Send a single message
    Ask {
        /// The message to send
        #[arg(short, long)]
        message: String,

        /// Background mode: the agent may answer with silence
        #[arg(long)]
        silent: bool,
    },

    /// Print a starter config.toml
    Config {
        /// Load and validate the current configuration instead
        #[arg(long)]
        validate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for answers
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat => commands::chat::run().await?,
        Commands::Ask { message, silent } => commands::ask::run(message, silent).await?,
        Commands::Config { validate: false } => commands::config_cmd::show(),
        Commands::Config { validate: true } => commands::config_cmd::validate()?,
    }

    Ok(())
}
