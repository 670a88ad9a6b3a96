//! Interactive chat command
//!
//! Restores the session, spawns the sync core with the terminal presenter,
//! and forwards stdin lines as messages until `/quit` or EOF.

use std::fs::File;

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use palaver_core::{ChatClient, Config, SessionState};

use crate::output::Output;
use crate::presenter::TerminalPresenter;

/// Run the interactive chat session
pub async fn run(config: &Config, output: &Output) -> Result<()> {
    init_logging(config);

    let mut client = ChatClient::connect(config);
    super::wait_for_connection(&client, config).await?;

    let state = client.restore().await;
    let SessionState::Authenticated(user) = state else {
        bail!("Not logged in. Run `palaver login --email you@example.com` first.");
    };
    info!("Chat session started for {}", user.email);

    output.message(&format!(
        "Connected as {}. Type a message and press Enter; /quit to exit.",
        user.email
    ));

    let sync_handle = client.spawn_sync(TerminalPresenter::new())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }

        if let Err(e) = client.send_message(text).await {
            if e.is_validation() {
                eprintln!("Message rejected: {}", e);
            } else {
                eprintln!("Send failed: {}", e);
            }
        }
    }

    client.shutdown().await;
    sync_handle.abort();

    output.message("Bye.");
    Ok(())
}

/// Initialize file-based logging for the interactive session
///
/// Logging to stdout would interleave with the rendered chat, so log lines
/// go to a file under the data directory instead.
fn init_logging(config: &Config) {
    let log_path = config.data_dir.join("palaver.log");

    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("palaver_core=info,palaver=info"));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();
}
