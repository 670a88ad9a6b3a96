//! Palaver CLI
//!
//! Command-line interface for Palaver - a minimal real-time chat client.

use anyhow::Result;
use clap::{Parser, Subcommand};

use palaver_core::Config;

mod commands;
mod output;
mod presenter;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "palaver")]
#[command(about = "Palaver - a minimal real-time chat client")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat (default when logged in)
    Chat,
    /// Log in with email and password
    Login {
        /// Account email
        #[arg(long)]
        email: String,
        /// Password (read from PALAVER_PASSWORD if omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account and log in
    Signup {
        /// Account email
        #[arg(long)]
        email: String,
        /// Password (read from PALAVER_PASSWORD if omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out and clear the persisted token
    Logout,
    /// Show session and connection status
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (server_url, data_dir, page_size, request_timeout_secs)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need a server connection
    if let Some(Commands::Config { command }) = &cli.command {
        return match command.clone().unwrap_or(ConfigCommands::Show) {
            ConfigCommands::Show => commands::config::show(&output),
            ConfigCommands::Set { key, value } => commands::config::set(key, value, &output),
        };
    }

    let config = Config::load()?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => commands::chat::run(&config, &output).await,
        Commands::Login { email, password } => {
            commands::session::login(&config, email, password, &output).await
        }
        Commands::Signup { email, password } => {
            commands::session::signup(&config, email, password, &output).await
        }
        Commands::Logout => commands::session::logout(&config, &output).await,
        Commands::Status => commands::status::show(&config, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}
