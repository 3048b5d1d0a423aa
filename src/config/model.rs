// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::paths::AppPaths;

/// Top-level configuration as read from `Harvest.toml`.
///
/// ```toml
/// [toolchain]
/// program = "meteor"
/// production = true
/// settings = "settings-prod.json"
/// ignore_stderr = ["deprecated API"]
///
/// [build]
/// project_dir = "../app"
/// output_dir = ".desktop-build/meteor"
/// base_url = "http://127.0.0.1:3000"
/// port = 3080
/// timeout_secs = 600
/// ```
///
/// Both sections and every key are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub toolchain: ToolchainSection,

    #[serde(default)]
    pub build: BuildSection,
}

/// `[toolchain]` section: how the toolchain is launched.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSection {
    /// Executable to run.
    #[serde(default = "default_program")]
    pub program: String,

    /// Release identifier to use instead of reading `.meteor/release`.
    #[serde(default)]
    pub release: Option<String>,

    #[serde(default)]
    pub production: bool,

    /// Settings file passed with `--settings`.
    #[serde(default)]
    pub settings: Option<PathBuf>,

    /// Run with `METEOR_DESKTOP_DEBUG=1`.
    #[serde(default)]
    pub debug: bool,

    /// Extra stderr substrings that never count as errors.
    #[serde(default)]
    pub ignore_stderr: Vec<String>,

    /// Image name of the helper processes swept up after the toolchain on
    /// platforms without process groups.
    #[serde(default = "default_descendant_image")]
    pub descendant_image: String,
}

fn default_program() -> String {
    "meteor".to_string()
}

fn default_descendant_image() -> String {
    "node.exe".to_string()
}

impl Default for ToolchainSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            release: None,
            production: false,
            settings: None,
            debug: false,
            ignore_stderr: Vec::new(),
            descendant_image: default_descendant_image(),
        }
    }
}

/// `[build]` section: where things live and how long to wait.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,

    /// Destination for the harvested build; cleared on every run.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// URL the desktop app reaches the server at. Passed as
    /// `--mobile-server` and written into the runtime config.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Port of the toolchain's debug server.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Hard cap on a whole build session.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Always harvest from the artifact directory, whatever the release.
    #[serde(default)]
    pub force_cordova_build: bool,

    /// Where the toolchain transcript goes when a build fails.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".desktop-build/meteor")
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

pub const DEFAULT_PORT: u16 = 3080;
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
/// One day; a build that takes longer is stuck.
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_log_file() -> PathBuf {
    PathBuf::from("meteor.log")
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            output_dir: default_output_dir(),
            base_url: default_base_url(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            force_cordova_build: false,
            log_file: default_log_file(),
        }
    }
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>` (see `validate.rs`),
/// so holders can rely on a usable URL, port and timeout.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub toolchain: ToolchainSection,
    pub build: BuildSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(toolchain: ToolchainSection, build: BuildSection) -> Self {
        Self { toolchain, build }
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.build.timeout_secs)
    }

    /// Paths for this build, with relative entries resolved against `base`.
    pub fn paths(&self, base: &Path) -> AppPaths {
        AppPaths::new(
            &self.build.project_dir,
            &self.build.output_dir,
            &self.build.log_file,
        )
        .rooted_at(base)
    }
}
