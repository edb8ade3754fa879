//! Configuration loader
//!
//! Builds a [`Config`] from environment variables or a settings file.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `PANGEA_TOKEN` is missing, falls back to loading from file
//! 3. Probes a few well-known paths for the file
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `PANGEA_TOKEN`: API token (required)
//! - `PANGEA_DOMAIN`: Platform domain, e.g. `aws.us.pangea.cloud`
//! - `PANGEA_INSECURE`: Use `http` instead of `https` (true/false)
//! - `PANGEA_BASE_URL_TEMPLATE`: Per-service URL template
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./pangea.json` or `./pangea.toml` (current working directory)
//! 2. `../pangea.json` or `../pangea.toml` (parent directory)
//! 3. Relative to executable location

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pangea_domain::config::RetrySettings;
use pangea_domain::{Config, ConfigBuilder, PangeaError, Result};
use serde::Deserialize;

/// Settings file contents; every field but `token` is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub token: String,
    pub domain: Option<String>,
    pub base_url_template: Option<String>,
    pub insecure: Option<bool>,
    pub request_timeout_secs: Option<u64>,
    pub poll_result_timeout_secs: Option<u64>,
    pub queued_retry_enabled: Option<bool>,
    pub retry_enabled: Option<bool>,
    pub retry_max: Option<u32>,
    pub min_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub custom_user_agent: Option<String>,
    pub additional_headers: BTreeMap<String, String>,
}

impl ConfigFile {
    /// Builder seeded with every setting present in the file
    pub fn into_builder(self) -> ConfigBuilder {
        let mut builder = Config::builder(self.token).additional_headers(self.additional_headers);
        if let Some(domain) = self.domain {
            builder = builder.domain(domain);
        }
        if let Some(template) = self.base_url_template {
            builder = builder.base_url_template(template);
        }
        if let Some(insecure) = self.insecure {
            builder = builder.insecure(insecure);
        }
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.poll_result_timeout_secs {
            builder = builder.poll_result_timeout(Duration::from_secs(secs));
        }
        if let Some(enabled) = self.queued_retry_enabled {
            builder = builder.queued_retry_enabled(enabled);
        }
        if let Some(enabled) = self.retry_enabled {
            builder = builder.retry_enabled(enabled);
        }
        if let Some(retry_max) = self.retry_max {
            builder = builder.retry_max(retry_max);
        }
        if self.min_backoff_ms.is_some() || self.max_backoff_ms.is_some() {
            let defaults = RetrySettings::default();
            let min = self.min_backoff_ms.map_or(defaults.min_backoff, Duration::from_millis);
            let max = self.max_backoff_ms.map_or(defaults.max_backoff, Duration::from_millis);
            builder = builder.backoff(min, max);
        }
        if let Some(agent) = self.custom_user_agent {
            builder = builder.custom_user_agent(agent);
        }
        builder
    }

    /// # Errors
    ///
    /// Same as [`ConfigBuilder::build`].
    pub fn into_config(self) -> Result<Config> {
        self.into_builder().build()
    }
}

/// Load configuration with automatic fallback strategy
///
/// # Errors
///
/// [`PangeaError::InvalidConfig`] when neither source yields a valid
/// configuration.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
///
/// [`PangeaError::InvalidConfig`] when `PANGEA_TOKEN` is missing or the
/// resulting configuration does not validate.
pub fn load_from_env() -> Result<Config> {
    let token = env_var("PANGEA_TOKEN")?;
    let mut builder = Config::builder(token).insecure(env_bool("PANGEA_INSECURE", false));
    if let Some(domain) = env_opt("PANGEA_DOMAIN") {
        builder = builder.domain(domain);
    }
    if let Some(template) = env_opt("PANGEA_BASE_URL_TEMPLATE") {
        builder = builder.base_url_template(template);
    }
    builder.build()
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the well-known locations.
///
/// # Errors
///
/// [`PangeaError::InvalidConfig`] when the file is missing, unreadable,
/// in an unsupported format or describes an invalid configuration.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(PangeaError::InvalidConfig(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            PangeaError::InvalidConfig(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| PangeaError::InvalidConfig(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)?.into_config()
}

/// Parse a settings file; format is picked by extension
fn parse_config(contents: &str, path: &Path) -> Result<ConfigFile> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| PangeaError::InvalidConfig(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| PangeaError::InvalidConfig(format!("Invalid JSON format: {e}"))),
        _ => Err(PangeaError::InvalidConfig(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing settings file among the well-known locations
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(names().map(|name| cwd.join(name)));
        candidates.extend(names().map(|name| cwd.join("..").join(name)));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(names().map(|name| exe_dir.join(name)));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn names() -> impl Iterator<Item = &'static str> {
    ["pangea.json", "pangea.toml"].into_iter()
}

fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        PangeaError::InvalidConfig(format!("Missing required environment variable: {key}"))
    })
}

/// Set and non-blank
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
