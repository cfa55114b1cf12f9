//! Client configuration for the offline sync subsystem.
//!
//! Loaded from `<config_dir>/inkwell/config.json` and then overridden by
//! `INKWELL_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const CONFIG_FILE_NAME: &str = "config.json";
const DEFAULT_AUTO_SYNC_INTERVAL_SECS: u64 = 60;
const MIN_AUTO_SYNC_INTERVAL_SECS: u64 = 5;

pub const ENV_API_URL: &str = "INKWELL_API_URL";
pub const ENV_API_TOKEN: &str = "INKWELL_API_TOKEN";
pub const ENV_SYNC_INTERVAL: &str = "INKWELL_SYNC_INTERVAL_SECS";

/// Connection and scheduling settings.
///
/// The API token is a credential; it is never printed by `Debug`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default = "default_auto_sync_interval_secs")]
    pub auto_sync_interval_secs: u64,
    #[serde(default)]
    pub start_offline: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            api_token: None,
            auto_sync_interval_secs: DEFAULT_AUTO_SYNC_INTERVAL_SECS,
            start_offline: false,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("auto_sync_interval_secs", &self.auto_sync_interval_secs)
            .field("start_offline", &self.start_offline)
            .finish()
    }
}

const fn default_auto_sync_interval_secs() -> u64 {
    DEFAULT_AUTO_SYNC_INTERVAL_SECS
}

/// Default config file location
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("inkwell").join(CONFIG_FILE_NAME))
        .ok_or_else(|| Error::NotFound("user config directory".to_string()))
}

impl ClientConfig {
    /// Load the default config file with environment overrides applied
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_path(&default_config_path()?)?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load a config file; a missing file yields defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::InvalidInput(format!(
                "failed to parse config at {}: {error}",
                path.display()
            ))
        })?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        normalized.validate()?;
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = normalize_text_option(lookup(ENV_API_URL)) {
            self.api_base_url = Some(url);
        }
        if let Some(token) = normalize_text_option(lookup(ENV_API_TOKEN)) {
            self.api_token = Some(token);
        }
        if let Some(raw) = normalize_text_option(lookup(ENV_SYNC_INTERVAL)) {
            self.auto_sync_interval_secs = raw.parse().map_err(|_| {
                Error::InvalidInput(format!("{ENV_SYNC_INTERVAL} must be a whole number of seconds"))
            })?;
        }
        self.normalize();
        self.validate()
    }

    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.auto_sync_interval_secs)
    }

    /// Whether a content service is configured
    pub fn has_remote(&self) -> bool {
        self.api_base_url.is_some()
    }

    fn normalize(&mut self) {
        self.api_base_url = normalize_text_option(self.api_base_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.api_token = normalize_text_option(self.api_token.take());
    }

    fn validate(&self) -> Result<()> {
        if let Some(url) = &self.api_base_url {
            if !is_http_url(url) {
                return Err(Error::InvalidInput(
                    "api_base_url must include http:// or https://".to_string(),
                ));
            }
        }
        if self.auto_sync_interval_secs < MIN_AUTO_SYNC_INTERVAL_SECS {
            return Err(Error::InvalidInput(format!(
                "auto_sync_interval_secs must be at least {MIN_AUTO_SYNC_INTERVAL_SECS}"
            )));
        }
        Ok(())
    }
}
