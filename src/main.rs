//! umit-chat - terminal client for UMit doctor/patient chat
//!
//! Lists conversations, prints history and runs a live chat session
//! against the UMit backend.

mod api;
mod auth;
mod config;
mod models;
mod session;
mod transport;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "umit-chat")]
#[command(about = "Terminal client for UMit doctor/patient chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password (prefer UMIT_PASSWORD; the prompt used when omitted echoes input)
        #[arg(long, env = "UMIT_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Firebase web API key to store in the config
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Log out and clear cached credentials
    Logout,

    /// Show current authentication status
    Status,

    /// List recent conversations
    Chats,

    /// Print the stored history of a conversation
    History {
        /// Counterpart user id (from `chats` output)
        counterpart: String,
    },

    /// Open a live conversation; each input line is sent
    Chat {
        /// Counterpart user id (from `chats` output)
        counterpart: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Login {
            email,
            password,
            api_key,
        } => {
            auth::login(&email, password, api_key).await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Chats => {
            tracing::info!("Fetching conversations...");
            api::list_chats().await?;
        }
        Commands::History { counterpart } => {
            api::show_history(&counterpart).await?;
        }
        Commands::Chat { counterpart } => {
            session::interactive::run(&counterpart).await?;
        }
    }

    Ok(())
}
