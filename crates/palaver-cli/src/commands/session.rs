//! Session command handlers (login, signup, logout)

use anyhow::{Context, Result};

use palaver_core::{ChatClient, Config, Credentials, FileTokenStore, TokenStore};

use crate::output::{Output, OutputFormat};

/// Assemble credentials, falling back to PALAVER_PASSWORD for the password
fn credentials(email: String, password: Option<String>) -> Result<Credentials> {
    let password = match password {
        Some(p) => p,
        None => std::env::var("PALAVER_PASSWORD")
            .context("No password given. Pass --password or set PALAVER_PASSWORD.")?,
    };
    Ok(Credentials::new(email, password))
}

fn print_user(user: &palaver_core::User, verb: &str, output: &Output) {
    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({"id": user.id, "email": user.email})
            );
        }
        OutputFormat::Quiet => {
            println!("{}", user.id);
        }
        OutputFormat::Human => {
            println!("{} as {}", verb, user.email);
        }
    }
}

/// Log in and persist the session token
pub async fn login(
    config: &Config,
    email: String,
    password: Option<String>,
    output: &Output,
) -> Result<()> {
    let credentials = credentials(email, password)?;

    let client = ChatClient::connect(config);
    super::wait_for_connection(&client, config).await?;

    let user = client
        .login(Some(credentials))
        .await
        .context("Login failed")?;
    client.shutdown().await;

    print_user(&user, "Logged in", output);
    Ok(())
}

/// Create an account, then log in with the same credentials
pub async fn signup(
    config: &Config,
    email: String,
    password: Option<String>,
    output: &Output,
) -> Result<()> {
    let credentials = credentials(email, password)?;

    let client = ChatClient::connect(config);
    super::wait_for_connection(&client, config).await?;

    let user = client.signup(credentials).await.context("Signup failed")?;
    client.shutdown().await;

    print_user(&user, "Signed up", output);
    Ok(())
}

/// Sign out: clear the persisted token, best-effort server invalidation
pub async fn logout(config: &Config, output: &Output) -> Result<()> {
    let client = ChatClient::connect(config);

    // Server-side invalidation only works while the server is reachable;
    // the local token goes away regardless
    if super::wait_for_connection(&client, config).await.is_ok() {
        let _ = client.restore().await;
        let _ = client.logout().await;
    }
    client.shutdown().await;

    FileTokenStore::new(config.token_path()).remove()?;

    output.success("Signed out");
    Ok(())
}
