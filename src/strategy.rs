// src/strategy.rs

//! Picks how the `web.cordova` build is obtained, based on the toolchain
//! release the app is pinned to.
//!
//! Releases after `1.3.4` serve a complete cordova index from the running
//! dev server, so we fetch it over HTTP. Older releases only leave a usable
//! build on disk. `1.3.4` itself got the fix in its `.2` patch build.

use std::fmt;

use tracing::warn;

use crate::types::Strategy;

/// First release that serves the cordova index from its dev server
/// (together with [`FIXED_PATCH_LEVEL`]).
pub const THRESHOLD: ReleaseVersion = ReleaseVersion::new(1, 3, 4);

/// Patch builds of [`THRESHOLD`] above this level carry the fix.
pub const FIXED_PATCH_LEVEL: u64 = 1;

/// Oldest release we know how to harvest at all.
pub const MINIMUM_SUPPORTED: ReleaseVersion = ReleaseVersion::new(1, 3, 3);

/// A toolchain release reduced to semantic version components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReleaseVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl ReleaseVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A parsed release identifier such as `METEOR@1.3.4.2-rc.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Release {
    pub version: ReleaseVersion,
    /// Fourth dotted component, when the release has one.
    pub patch_level: Option<u64>,
}

/// Parse a release identifier.
///
/// - strips a leading channel tag (`METEOR@`)
/// - strips a pre-release suffix (`-rc.1`, `-beta.3`)
/// - pads missing components with `0` (`1.4` -> `1.4.0`)
///
/// Returns `None` for identifiers that are not numeric releases, e.g. `none`
/// or a checkout name.
pub fn parse_release(raw: &str) -> Option<Release> {
    let raw = raw.trim();
    let without_channel = match raw.rfind('@') {
        Some(idx) => &raw[idx + 1..],
        None => raw,
    };
    let numeric = without_channel
        .split('-')
        .next()
        .unwrap_or(without_channel);

    let parts: Vec<u64> = numeric
        .split('.')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    if parts.is_empty() {
        return None;
    }

    let component = |idx: usize| parts.get(idx).copied().unwrap_or(0);
    Some(Release {
        version: ReleaseVersion::new(component(0), component(1), component(2)),
        patch_level: parts.get(3).copied(),
    })
}

/// Choose the acquisition strategy for a toolchain release.
///
/// `force_directory` always wins. Unparseable releases fall back to the
/// on-disk strategy, which works with every release.
pub fn select(release: &str, force_directory: bool) -> Strategy {
    if force_directory {
        return Strategy::FromArtifactDirectory;
    }

    let Some(parsed) = parse_release(release) else {
        warn!(release = %release, "could not parse toolchain release; using artifact directory");
        return Strategy::FromArtifactDirectory;
    };

    select_for(parsed)
}

fn select_for(release: Release) -> Strategy {
    if release.version > THRESHOLD {
        return Strategy::FromRunningServer;
    }

    if release.version == THRESHOLD
        && release
            .patch_level
            .is_some_and(|level| level > FIXED_PATCH_LEVEL)
    {
        return Strategy::FromRunningServer;
    }

    Strategy::FromArtifactDirectory
}

/// Whether a release is recent enough to be harvested. Purely advisory.
pub fn is_supported(release: &str) -> bool {
    parse_release(release).is_some_and(|r| r.version >= MINIMUM_SUPPORTED)
}
