//! Roomcast CLI: reference host for the chat agent.
//!
//! Commands:
//! - `chat`: Talk to the agent in the terminal
//! - `search`: Run one web search and print the raw payload
//! - `config`: Show the effective configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "roomcast",
    about = "Roomcast: a streaming, search-augmented agent for chat rooms",
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
    /// Chat with the agent in this terminal
    Chat,

    /// Run a web search and print the payload the agent would see
    Search {
        /// The query to search for
        query: String,
    },

    /// Show the effective configuration (secrets redacted)
    Config {
        /// Print a starter config file instead
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so streamed replies on stdout stay readable
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat => commands::chat::run().await?,
        Commands::Search { query } => commands::search::run(&query).await?,
        Commands::Config { default } => commands::config_cmd::run(default)?,
    }

    Ok(())
}
