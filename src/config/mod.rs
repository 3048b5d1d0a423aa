// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: reading the file and applying environment overrides.
//! - `validate.rs`: checking values before anything is launched.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{apply_env_overrides, default_config_path, load_and_validate, load_from_path};
pub use model::{BuildSection, ConfigFile, RawConfigFile, ToolchainSection};
