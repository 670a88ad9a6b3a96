//! Command handlers

pub mod chat;
pub mod config;
pub mod session;
pub mod status;

use std::time::Duration;

use anyhow::{bail, Result};

use palaver_core::transport::ConnectionStatus;
use palaver_core::{ChatClient, Config};

/// How long commands wait for the initial connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for the background connection task to reach the server
pub async fn wait_for_connection(client: &ChatClient, config: &Config) -> Result<()> {
    let mut status = client.connection_status();

    let connected = tokio::time::timeout(CONNECT_TIMEOUT, async move {
        loop {
            if *status.borrow_and_update() == ConnectionStatus::Connected {
                return true;
            }
            if status.changed().await.is_err() {
                return false;
            }
        }
    })
    .await;

    match connected {
        Ok(true) => Ok(()),
        Ok(false) => bail!("Connection task stopped unexpectedly"),
        Err(_) => bail!(
            "Could not reach {} within {}s. Check that the server is running.",
            config.server_url,
            CONNECT_TIMEOUT.as_secs()
        ),
    }
}
