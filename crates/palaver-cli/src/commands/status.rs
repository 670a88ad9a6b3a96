//! Status command handler

use anyhow::Result;

use palaver_core::{ChatClient, Config, FileTokenStore, SessionState, TokenStore};

use crate::output::{Output, OutputFormat};

/// Show connection, session, and storage status
pub async fn show(config: &Config, output: &Output) -> Result<()> {
    let token_present = FileTokenStore::new(config.token_path()).get().is_some();

    let client = ChatClient::connect(config);
    let reachable = super::wait_for_connection(&client, config).await.is_ok();
    let state = if reachable {
        client.restore().await
    } else {
        SessionState::Anonymous
    };
    client.shutdown().await;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "server_url": config.server_url,
                    "reachable": reachable,
                    "token_present": token_present,
                    "session": {
                        "authenticated": state.is_authenticated(),
                        "email": state.user().map(|u| u.email.clone()),
                    },
                    "storage": {
                        "data_dir": config.data_dir,
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!(
                "{}",
                if state.is_authenticated() {
                    "authenticated"
                } else {
                    "anonymous"
                }
            );
        }
        OutputFormat::Human => {
            println!("Palaver Status");
            println!("==============");
            println!();
            println!("Server:");
            println!("  URL:    {}", config.server_url);
            println!(
                "  Status: {}",
                if reachable { "reachable" } else { "unreachable" }
            );
            println!();
            println!("Session:");
            match state.user() {
                Some(user) => println!("  Logged in as {}", user.email),
                None => println!("  Not logged in"),
            }
            println!(
                "  Token: {}",
                if token_present { "present" } else { "absent" }
            );
            println!();
            println!("Storage:");
            println!("  Location: {}", config.data_dir.display());
        }
    }

    Ok(())
}
