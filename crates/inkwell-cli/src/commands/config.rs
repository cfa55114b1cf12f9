use std::path::Path;

use inkwell_core::config::ClientConfig;
use inkwell_core::util::normalize_text_option;
use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub path: String,
    pub api_base_url: Option<String>,
    pub api_token: Option<&'static str>,
    pub auto_sync_interval_secs: u64,
    pub start_offline: bool,
}

pub fn run_config(command: ConfigCommands, config_path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_url,
            token,
            interval,
            start_offline,
        } => run_config_init(config_path, api_url, token, interval, start_offline),
        ConfigCommands::Show { json } => run_config_show(config_path, json),
    }
}

pub fn run_config_init(
    config_path: &Path,
    api_url: Option<String>,
    token: Option<String>,
    interval: Option<u64>,
    start_offline: Option<bool>,
) -> Result<(), CliError> {
    let existing = ClientConfig::load_from_path(config_path)?;
    let config = merge_config_init(existing, api_url, token, interval, start_offline);
    config.save_to_path(config_path)?;

    println!("Config written to {}", config_path.display());
    if config.api_base_url.is_none() {
        println!("No content service configured yet; changes will stay queued locally.");
    }
    Ok(())
}

/// Apply explicitly passed values over an existing config
pub fn merge_config_init(
    mut config: ClientConfig,
    api_url: Option<String>,
    token: Option<String>,
    interval: Option<u64>,
    start_offline: Option<bool>,
) -> ClientConfig {
    if let Some(url) = normalize_text_option(api_url) {
        config.api_base_url = Some(url);
    }
    if let Some(token) = normalize_text_option(token) {
        config.api_token = Some(token);
    }
    if let Some(interval) = interval {
        config.auto_sync_interval_secs = interval;
    }
    if let Some(start_offline) = start_offline {
        config.start_offline = start_offline;
    }
    config
}

pub fn run_config_show(config_path: &Path, as_json: bool) -> Result<(), CliError> {
    let mut config = ClientConfig::load_from_path(config_path)?;
    config.apply_env_with(|key| std::env::var(key).ok())?;
    let view = config_view(&config, config_path);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("Config file:   {}", view.path);
    println!(
        "API base URL:  {}",
        view.api_base_url.as_deref().unwrap_or("(not set)")
    );
    println!("API token:     {}", view.api_token.unwrap_or("(not set)"));
    println!("Sync interval: {}s", view.auto_sync_interval_secs);
    println!("Start offline: {}", view.start_offline);
    Ok(())
}

pub fn config_view(config: &ClientConfig, config_path: &Path) -> ConfigView {
    ConfigView {
        path: config_path.display().to_string(),
        api_base_url: config.api_base_url.clone(),
        api_token: config.api_token.as_ref().map(|_| "[REDACTED]"),
        auto_sync_interval_secs: config.auto_sync_interval_secs,
        start_offline: config.start_offline,
    }
}
