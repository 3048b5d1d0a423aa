#![allow(dead_code)]

use std::path::Path;

use cordova_harvest::config::{ConfigFile, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn program(mut self, program: &str) -> Self {
        self.config.toolchain.program = program.to_string();
        self
    }

    pub fn release(mut self, release: &str) -> Self {
        self.config.toolchain.release = Some(release.to_string());
        self
    }

    pub fn ignore_stderr(mut self, substring: &str) -> Self {
        self.config.toolchain.ignore_stderr.push(substring.to_string());
        self
    }

    pub fn production(mut self) -> Self {
        self.config.toolchain.production = true;
        self
    }

    /// Point project, output and log file at `root`.
    pub fn rooted_in(mut self, root: &Path) -> Self {
        self.config.build.project_dir = root.join("app");
        self.config.build.output_dir = root.join("desktop/meteor");
        self.config.build.log_file = root.join("meteor.log");
        self
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.config.build.base_url = url.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.build.port = port;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.build.timeout_secs = secs;
        self
    }

    pub fn force_cordova_build(mut self) -> Self {
        self.config.build.force_cordova_build = true;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
