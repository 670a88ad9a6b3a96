//! Config command handlers

use anyhow::{bail, Context, Result};

use palaver_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "server_url": config.server_url,
                    "data_dir": config.data_dir,
                    "page_size": config.page_size,
                    "request_timeout_secs": config.request_timeout_secs,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.server_url);
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  server_url:           {}", config.server_url);
            println!("  data_dir:             {}", config.data_dir.display());
            println!("  page_size:            {}", config.page_size);
            println!("  request_timeout_secs: {}", config.request_timeout_secs);
            println!();
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, output: &Output) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;

    match key.as_str() {
        "server_url" => {
            config.server_url = value.clone();
        }
        "data_dir" => {
            config.data_dir = value.clone().into();
        }
        "page_size" => {
            config.page_size = value
                .parse()
                .context("Invalid value for page_size. Use a positive number.")?;
        }
        "request_timeout_secs" => {
            config.request_timeout_secs = value
                .parse()
                .context("Invalid value for request_timeout_secs. Use a positive number.")?;
        }
        _ => {
            bail!(
                "Unknown configuration key '{}'. \
                 Valid keys: server_url, data_dir, page_size, request_timeout_secs",
                key
            );
        }
    }

    config.save().context("Failed to save configuration")?;
    output.success(&format!("Set {} = {}", key, value));
    Ok(())
}
