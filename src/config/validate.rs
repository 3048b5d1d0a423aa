// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile, MAX_TIMEOUT_SECS};
use crate::errors::{HarvestError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = HarvestError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.toolchain, raw.build))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_toolchain(cfg)?;
    validate_base_url(&cfg.build.base_url)?;

    if cfg.build.port == 0 {
        return Err(HarvestError::ConfigError(
            "[build].port must be between 1 and 65535 (got 0)".to_string(),
        ));
    }
    if !(1..=MAX_TIMEOUT_SECS).contains(&cfg.build.timeout_secs) {
        return Err(HarvestError::ConfigError(format!(
            "[build].timeout_secs must be between 1 and {MAX_TIMEOUT_SECS} (got {})",
            cfg.build.timeout_secs
        )));
    }
    Ok(())
}

fn validate_toolchain(cfg: &RawConfigFile) -> Result<()> {
    if cfg.toolchain.program.trim().is_empty() {
        return Err(HarvestError::ConfigError(
            "[toolchain].program must not be empty".to_string(),
        ));
    }
    if cfg.toolchain.ignore_stderr.iter().any(|s| s.is_empty()) {
        // an empty substring would silence every stderr line
        return Err(HarvestError::ConfigError(
            "[toolchain].ignore_stderr must not contain empty strings".to_string(),
        ));
    }
    Ok(())
}

fn validate_base_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| {
            HarvestError::ConfigError(format!(
                "[build].base_url must start with http:// or https:// (got '{url}')"
            ))
        })?;

    if rest.is_empty() || rest.starts_with('/') {
        return Err(HarvestError::ConfigError(format!(
            "[build].base_url has no host (got '{url}')"
        )));
    }
    Ok(())
}
