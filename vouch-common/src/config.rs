//! Configuration file discovery and secret resolution
//!
//! Config file priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`~/.config/vouch/config.toml` on Linux)
//! 4. Built-in defaults (no file)
//!
//! Secrets (API tokens) resolve ENV → TOML; a missing config file is never fatal.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Application directory name under the platform config/data directories
pub const APP_DIR: &str = "vouch";

/// Locate the TOML config file, if any
///
/// Returns `None` when neither the CLI nor the environment names a file and
/// no file exists in the platform config directory.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_file().filter(|p| p.exists())
}

/// Platform config file location (whether or not it exists)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// Load a TOML config file into `T`
///
/// `None` or a missing file yields `T::default()` with a warning; a file that
/// exists but fails to parse is a configuration error.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using built-in defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    info!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Resolve the SQLite database path
///
/// CLI → environment → `<data dir>/vouch/vouch.db`.
pub fn resolve_database_path(cli_arg: Option<&Path>, env_var_name: &str) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./vouch_data"))
        .join("vouch.db")
}

/// Resolve an API secret from environment and TOML
///
/// **Priority:** ENV → TOML. Returns `None` when neither holds a valid key;
/// collectors then run unauthenticated.
pub fn resolve_secret(label: &str, env_var_name: &str, toml_value: Option<&str>) -> Option<String> {
    let env_key = std::env::var(env_var_name).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_value.filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "{} found in both {} and TOML config. Using environment (highest priority).",
            label, env_var_name
        );
    }

    if let Some(key) = env_key {
        info!("{} loaded from environment variable", label);
        return Some(key);
    }

    if let Some(key) = toml_key {
        info!("{} loaded from TOML config", label);
        return Some(key.to_string());
    }

    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
