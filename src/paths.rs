// src/paths.rs

//! Locations of everything the harvest reads and writes.

use std::path::{Path, PathBuf};

/// Where the toolchain leaves its `web.cordova` build, relative to the app.
pub const CORDOVA_BUILD_DIR: &str = ".meteor/local/cordova-build/www/application";
pub const INDEX_FILE: &str = "index.html";
pub const MANIFEST_FILE: &str = "program.json";
pub const RELEASE_FILE: &str = ".meteor/release";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Root of the toolchain project.
    pub project_dir: PathBuf,
    /// Artifact directory the toolchain builds into.
    pub build_dir: PathBuf,
    /// Destination inside the desktop app; cleared before every copy.
    pub output_dir: PathBuf,
    /// Transcript written when a build fails.
    pub log_file: PathBuf,
}

impl AppPaths {
    pub fn new(project_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, log_file: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let build_dir = project_dir.join(CORDOVA_BUILD_DIR);
        Self {
            project_dir,
            build_dir,
            output_dir: output_dir.into(),
            log_file: log_file.into(),
        }
    }

    pub fn index(&self) -> PathBuf {
        self.build_dir.join(INDEX_FILE)
    }

    pub fn manifest(&self) -> PathBuf {
        self.build_dir.join(MANIFEST_FILE)
    }

    pub fn release_file(&self) -> PathBuf {
        self.project_dir.join(RELEASE_FILE)
    }

    pub fn output_index(&self) -> PathBuf {
        self.output_dir.join(INDEX_FILE)
    }

    pub fn output_manifest(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_FILE)
    }

    /// Resolve relative paths against `base` (usually the config file's
    /// directory).
    pub fn rooted_at(self, base: &Path) -> Self {
        let root = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
        Self::new(root(self.project_dir), root(self.output_dir), root(self.log_file))
    }
}
