// src/artifacts/copy.rs

use std::fs;
use std::path::Path;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::error;
use walkdir::WalkDir;

use crate::errors::{ArtifactKind, CollectError};
use crate::paths::AppPaths;

/// Remove `dir` and everything in it, then recreate it empty.
pub fn clear_dir(dir: &Path) -> Result<(), CollectError> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("clearing {}", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(())
}

/// Check the build directory, index and manifest all exist.
///
/// Every missing item is logged with its exact path; the first one is
/// returned.
pub fn verify_sources(paths: &AppPaths) -> Result<(), CollectError> {
    let expected = [
        (ArtifactKind::RootDirectory, paths.build_dir.clone(), paths.build_dir.is_dir()),
        (ArtifactKind::Index, paths.index(), paths.index().is_file()),
        (ArtifactKind::Manifest, paths.manifest(), paths.manifest().is_file()),
    ];

    let mut first_missing = None;
    for (kind, path, present) in expected {
        if !present {
            error!(%kind, path = %path.display(), "build artifact missing");
            first_missing.get_or_insert(CollectError::MissingArtifact { kind, path });
        }
    }

    match first_missing {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Fail with [`CollectError::Cancelled`] once `cancel` has fired.
pub fn ensure_live(cancel: &CancellationToken) -> Result<(), CollectError> {
    if cancel.is_cancelled() {
        return Err(CollectError::Cancelled);
    }
    Ok(())
}

/// Recursively copy `src` into `dst`. Returns the number of files copied.
///
/// Stops before the next entry once `cancel` fires.
pub fn copy_tree(src: &Path, dst: &Path, cancel: &CancellationToken) -> Result<usize, CollectError> {
    let mut copied = 0;

    for entry in WalkDir::new(src) {
        ensure_live(cancel)?;
        let entry = entry.with_context(|| format!("walking {}", src.display()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("{} is outside {}", entry.path().display(), src.display()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).with_context(|| format!("creating {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("copying {} to {}", entry.path().display(), target.display())
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Make every copied file writable by the desktop app.
///
/// The toolchain may leave files read-only, which breaks later rewrites and
/// packaging.
pub fn normalize_permissions(root: &Path, cancel: &CancellationToken) -> Result<(), CollectError> {
    for entry in WalkDir::new(root) {
        ensure_live(cancel)?;
        let entry = entry.with_context(|| format!("walking {}", root.display()))?;
        set_writable(entry.path(), entry.file_type().is_dir())?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_writable(path: &Path, is_dir: bool) -> Result<(), CollectError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = if is_dir { 0o755 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("setting permissions on {}", path.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_writable(path: &Path, _is_dir: bool) -> Result<(), CollectError> {
    let mut permissions = fs::metadata(path)
        .with_context(|| format!("reading permissions of {}", path.display()))?
        .permissions();
    if permissions.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("clearing read-only flag on {}", path.display()))?;
    }
    Ok(())
}
