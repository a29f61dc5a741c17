//! Concierge CLI: the main entry point.
//!
//! Commands:
//! - `ask`: Answer a single message and exit
//! - `chat`: Interactive conversation
//! - `config`: Print the default configuration or the config path
//! - `doctor`: Check configuration and provider reachability

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "concierge",
    about = "Concierge: route, plan and execute requests across your assistant's capabilities",
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
    /// Answer a single message
    Ask {
        /// The message to answer
        #[arg(short, long)]
        message: String,

        /// Conversation owner
        #[arg(short, long, default_value = "local_user", env = "CONCIERGE_USER")]
        user: String,

        /// Also print the classification and step results as JSON
        #[arg(long)]
        explain: bool,
    },

    /// Chat interactively
    Chat {
        /// Conversation owner
        #[arg(short, long, default_value = "local_user", env = "CONCIERGE_USER")]
        user: String,
    },

    /// Print the default configuration
    Config {
        /// Print the config file location instead
        #[arg(long)]
        path: bool,
    },

    /// Diagnose configuration and provider health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ask {
            message,
            user,
            explain,
        } => commands::ask::run(&message, &user, explain).await?,
        Commands::Chat { user } => commands::chat::run(&user).await?,
        Commands::Config { path } => commands::config_cmd::run(path)?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
