// src/readiness.rs

//! Disk-based readiness check for the artifact directory strategy.
//!
//! The toolchain rewrites `index.html` and `program.json` while it builds.
//! A build counts as ready once both exist and the manifest differs from the
//! last one we saw, so a directory left over from a previous run is never
//! mistaken for a fresh build.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::fs::FileSystem;
use crate::paths::AppPaths;
use crate::types::Strategy;

/// Last observed manifest contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessSnapshot {
    manifest: Vec<u8>,
    digest: blake3::Hash,
}

impl ReadinessSnapshot {
    pub fn new(manifest: Vec<u8>) -> Self {
        let digest = blake3::hash(&manifest);
        Self { manifest, digest }
    }

    pub fn manifest(&self) -> &[u8] {
        &self.manifest
    }

    /// Short hex digest for log lines.
    pub fn short_digest(&self) -> String {
        self.digest.to_hex()[..12].to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready(ReadinessSnapshot),
    NotReady,
}

#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    fs: Arc<dyn FileSystem>,
    paths: AppPaths,
}

impl ReadinessPoller {
    pub fn new(fs: Arc<dyn FileSystem>, paths: AppPaths) -> Self {
        Self { fs, paths }
    }

    /// Snapshot of whatever manifest is on disk before the build starts.
    pub fn capture_existing(&self) -> Option<ReadinessSnapshot> {
        let manifest = self.paths.manifest();
        if !self.fs.is_file(&manifest) {
            return None;
        }
        match self.fs.read(&manifest) {
            Ok(bytes) => {
                let snapshot = ReadinessSnapshot::new(bytes);
                debug!(
                    manifest = %snapshot.short_digest(),
                    "captured manifest left over from a previous build"
                );
                Some(snapshot)
            }
            Err(e) => {
                debug!(error = %e, "could not read existing manifest; treating as absent");
                None
            }
        }
    }

    /// Check once whether a fresh build is on disk.
    ///
    /// The running-server strategy is never ready from disk; it is driven by
    /// the server-up marker and HTTP fetches instead.
    pub fn poll(&self, strategy: Strategy, previous: Option<&ReadinessSnapshot>) -> Readiness {
        if strategy != Strategy::FromArtifactDirectory {
            return Readiness::NotReady;
        }

        let index = self.paths.index();
        let manifest = self.paths.manifest();
        if !self.fs.is_file(&index) || !self.fs.is_file(&manifest) {
            trace!("artifact directory not complete yet");
            return Readiness::NotReady;
        }

        let bytes = match self.fs.read(&manifest) {
            Ok(bytes) => bytes,
            Err(e) => {
                // The toolchain may be mid-write.
                trace!(error = %e, "manifest not readable yet");
                return Readiness::NotReady;
            }
        };

        if previous.is_some_and(|prev| prev.manifest() == bytes.as_slice()) {
            trace!("manifest unchanged since last observation");
            return Readiness::NotReady;
        }

        let snapshot = ReadinessSnapshot::new(bytes);
        debug!(manifest = %snapshot.short_digest(), "fresh build detected on disk");
        Readiness::Ready(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn setup() -> (MockFileSystem, ReadinessPoller, AppPaths) {
        let fs = MockFileSystem::new();
        let paths = AppPaths::new("/app", "/out", "/app/meteor.log");
        let poller = ReadinessPoller::new(Arc::new(fs.clone()), paths.clone());
        (fs, poller, paths)
    }

    #[test]
    fn needs_both_index_and_manifest() {
        let (fs, poller, paths) = setup();
        assert_eq!(poller.poll(Strategy::FromArtifactDirectory, None), Readiness::NotReady);

        fs.add_file(paths.manifest(), r#"{"manifest":[]}"#);
        assert_eq!(poller.poll(Strategy::FromArtifactDirectory, None), Readiness::NotReady);

        fs.add_file(paths.index(), "<html></html>");
        assert!(matches!(
            poller.poll(Strategy::FromArtifactDirectory, None),
            Readiness::Ready(_)
        ));
    }

    #[test]
    fn stale_manifest_is_not_ready_until_it_changes() {
        let (fs, poller, paths) = setup();
        fs.add_file(paths.index(), "<html></html>");
        fs.add_file(paths.manifest(), r#"{"manifest":[1]}"#);

        let stale = poller.capture_existing().expect("manifest exists");
        assert_eq!(
            poller.poll(Strategy::FromArtifactDirectory, Some(&stale)),
            Readiness::NotReady
        );

        fs.add_file(paths.manifest(), r#"{"manifest":[2]}"#);
        match poller.poll(Strategy::FromArtifactDirectory, Some(&stale)) {
            Readiness::Ready(snapshot) => {
                assert_eq!(snapshot.manifest(), br#"{"manifest":[2]}"#);
                assert_ne!(snapshot.short_digest(), stale.short_digest());
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn server_strategy_never_polls_ready() {
        let (fs, poller, paths) = setup();
        fs.add_file(paths.index(), "<html></html>");
        fs.add_file(paths.manifest(), "{}");
        assert_eq!(poller.poll(Strategy::FromRunningServer, None), Readiness::NotReady);
        assert!(poller.capture_existing().is_some());
    }
}
