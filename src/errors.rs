// src/errors.rs

//! Crate-wide error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::OutcomeReason;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Terminal outcome of a build session other than success.
    #[error("Build failed: {0}")]
    Build(OutcomeReason),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Which expected artifact is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    RootDirectory,
    Index,
    Manifest,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::RootDirectory => f.write_str("build directory"),
            ArtifactKind::Index => f.write_str("index.html"),
            ArtifactKind::Manifest => f.write_str("program.json"),
        }
    }
}

/// Failures of the artifact collector. All of them end a session with
/// [`OutcomeReason::CopyFailure`].
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("missing {kind}: {}", path.display())]
    MissingArtifact { kind: ArtifactKind, path: PathBuf },

    #[error("fetching {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{what} fetched from the debug server does not look right")]
    SanityCheck { what: &'static str },

    #[error("rewrite failed: {0}")]
    Rewrite(String),

    /// The session settled while the copy was still running.
    #[error("collection cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, HarvestError>;
