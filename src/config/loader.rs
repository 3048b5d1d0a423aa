// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{HarvestError, Result};

/// Overrides the debug server port.
pub const PORT_ENV_VAR: &str = "HARVEST_PORT";
/// Overrides the whole-session timeout, in seconds.
pub const TIMEOUT_ENV_VAR: &str = "HARVEST_BUILD_TIMEOUT";

/// Load a configuration file and return the raw `RawConfigFile`.
///
/// Only TOML deserialization; use [`load_and_validate`] for a checked
/// config.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file, apply environment overrides and validate.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let mut raw_config = load_from_path(&path)?;
    apply_env_overrides(&mut raw_config, |key| std::env::var(key).ok())?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Built-in defaults plus environment overrides, for running without a
/// config file.
pub fn defaults_with_env() -> Result<ConfigFile> {
    let mut raw_config = RawConfigFile::default();
    apply_env_overrides(&mut raw_config, |key| std::env::var(key).ok())?;
    ConfigFile::try_from(raw_config)
}

/// Apply `HARVEST_PORT` and `HARVEST_BUILD_TIMEOUT`.
///
/// `lookup` returns the value of an environment variable, which keeps this
/// testable without touching the process environment.
pub fn apply_env_overrides<F>(raw: &mut RawConfigFile, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(PORT_ENV_VAR) {
        raw.build.port = value.trim().parse().map_err(|_| {
            HarvestError::ConfigError(format!("{PORT_ENV_VAR} must be a port number (got '{value}')"))
        })?;
        debug!(port = raw.build.port, "debug port overridden from environment");
    }

    if let Some(value) = lookup(TIMEOUT_ENV_VAR) {
        raw.build.timeout_secs = value.trim().parse().map_err(|_| {
            HarvestError::ConfigError(format!(
                "{TIMEOUT_ENV_VAR} must be a number of seconds (got '{value}')"
            ))
        })?;
        debug!(timeout_secs = raw.build.timeout_secs, "build timeout overridden from environment");
    }

    Ok(())
}

/// `Harvest.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Harvest.toml")
}
