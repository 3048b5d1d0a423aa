// src/artifacts/rewrite.rs

//! Text rewrites applied to a copied build.
//!
//! Two rewrites turn a mobile build into a desktop one:
//!
//! - **isDesktop injection.** The bundle sets `Meteor.isCordova = true` and
//!   only signals `startupDidComplete` inside an `if (Meteor.isCordova)`
//!   guard. Both are switched to `isDesktop`. Each must happen at least
//!   once across the bundle, or the desktop app would never finish
//!   starting up.
//! - **Runtime config.** `index.html` embeds the URL-encoded
//!   `__meteor_runtime_config__` JSON; its `ROOT_URL` and
//!   `DDP_DEFAULT_CONNECTION_URL` are pointed at the desktop base URL.
//!
//! Both rewrites are idempotent: a tree that was already rewritten passes
//! validation unchanged.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::copy::ensure_live;
use crate::errors::CollectError;

pub const STARTUP_CALL: &str = "startupDidComplete";

static CORDOVA_ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\.isCordova\s*=\s*(?:true|!0)").expect("valid regex"));

static DESKTOP_ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+\.isDesktop\s*=\s*(?:true|!0)").expect("valid regex"));

/// A flag used as a condition: `if (Package.meteor.Meteor.isCordova)`, or
/// minified `Meteor.isCordova&&...` and `a.isDesktop?...`. Group 1 is the
/// flag name. Assignments never match.
static PLATFORM_GUARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\w+\.)+(isCordova|isDesktop)\s*(?:\)|&&|\?)").expect("valid regex")
});

static RUNTIME_CONFIG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"__meteor_runtime_config__\s*=\s*JSON\.parse\(decodeURIComponent\("([^"]*)"\)\)"#)
        .expect("valid regex")
});

/// What the isDesktop rewrite found, counted after rewriting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteReport {
    /// `isDesktop` assignments present.
    pub assignments: usize,
    /// `startupDidComplete` calls guarded by `isDesktop`.
    pub startup_calls: usize,
}

impl std::ops::AddAssign for RewriteReport {
    fn add_assign(&mut self, other: Self) {
        self.assignments += other.assignments;
        self.startup_calls += other.startup_calls;
    }
}

/// Rewrite one script's source.
pub fn inject_is_desktop(source: &str) -> (String, RewriteReport) {
    let assigned = CORDOVA_ASSIGNMENT.replace_all(source, "$1.isDesktop = true");
    let (output, startup_calls) = relocate_startup_guards(&assigned);
    let assignments = DESKTOP_ASSIGNMENT.find_iter(&output).count();

    (
        output,
        RewriteReport {
            assignments,
            startup_calls,
        },
    )
}

/// Switch the guard closest before each `startupDidComplete` call to
/// `isDesktop`. Other `isCordova` checks in the file are left alone.
fn relocate_startup_guards(source: &str) -> (String, usize) {
    let guards: Vec<(usize, regex::Match<'_>)> = PLATFORM_GUARD
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let flag = caps.get(1)?;
            Some((whole.end(), flag))
        })
        .collect();

    let mut to_switch: Vec<(usize, usize)> = Vec::new();
    let mut guarded_calls = 0;

    for (call_at, _) in source.match_indices(STARTUP_CALL) {
        let Some((_, flag)) = guards.iter().rev().find(|(end, _)| *end <= call_at) else {
            continue;
        };
        guarded_calls += 1;
        if flag.as_str() == "isCordova" {
            let range = (flag.start(), flag.end());
            if !to_switch.contains(&range) {
                to_switch.push(range);
            }
        }
    }

    let mut output = source.to_string();
    // back to front so earlier offsets stay valid
    to_switch.sort_unstable();
    for (start, end) in to_switch.into_iter().rev() {
        output.replace_range(start..end, "isDesktop");
    }

    (output, guarded_calls)
}

#[derive(Debug, Deserialize)]
struct Manifest {
    manifest: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Script files to rewrite: the `js` entries of the manifest, or every
/// `*.js` file under `root` when the manifest is unusable.
fn script_files(root: &Path, manifest: &Path) -> Vec<PathBuf> {
    let listed = fs::read(manifest)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Manifest>(&bytes).ok());

    match listed {
        Some(manifest) => manifest
            .manifest
            .into_iter()
            .filter(|entry| entry.kind == "js")
            .map(|entry| {
                let path = entry.path.split('?').next().unwrap_or_default().to_string();
                root.join(path)
            })
            .filter(|path| path.is_file())
            .collect(),
        None => {
            debug!(manifest = %manifest.display(), "manifest unusable; rewriting every script");
            WalkDir::new(root)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "js"))
                .collect()
        }
    }
}

/// Inject `isDesktop` across a copied tree and validate that both rewrites
/// happened at least once. No file is touched once `cancel` fires.
pub fn inject_is_desktop_tree(
    root: &Path,
    manifest: &Path,
    cancel: &CancellationToken,
) -> Result<RewriteReport, CollectError> {
    let mut total = RewriteReport::default();

    for file in script_files(root, manifest) {
        ensure_live(cancel)?;
        let source = fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
        let (rewritten, report) = inject_is_desktop(&source);
        if rewritten != source {
            trace!(file = %file.display(), "rewrote script");
            fs::write(&file, rewritten).with_context(|| format!("writing {}", file.display()))?;
        }
        total += report;
    }

    if total.assignments == 0 {
        return Err(CollectError::Rewrite(
            "no isCordova assignment found to switch to isDesktop".to_string(),
        ));
    }
    if total.startup_calls == 0 {
        return Err(CollectError::Rewrite(format!(
            "no guarded {STARTUP_CALL} call found to switch to isDesktop"
        )));
    }
    Ok(total)
}

/// `http://host:port` -> `http://host:port/`.
pub fn normalize_base_url(base_url: &str) -> String {
    format!("{}/", base_url.trim_end_matches('/'))
}

/// Point the runtime config embedded in `html` at `base_url`.
pub fn rewrite_runtime_config(html: &str, base_url: &str) -> Result<String, CollectError> {
    let caps = RUNTIME_CONFIG
        .captures(html)
        .ok_or_else(|| CollectError::Rewrite("__meteor_runtime_config__ not found in index.html".to_string()))?;
    let Some(blob) = caps.get(1) else {
        return Err(CollectError::Rewrite("empty __meteor_runtime_config__".to_string()));
    };

    let decoded = urlencoding::decode(blob.as_str())
        .map_err(|e| CollectError::Rewrite(format!("runtime config is not URL-encoded UTF-8: {e}")))?;
    let mut config: serde_json::Value = serde_json::from_str(&decoded)
        .map_err(|e| CollectError::Rewrite(format!("runtime config is not JSON: {e}")))?;
    let Some(fields) = config.as_object_mut() else {
        return Err(CollectError::Rewrite("runtime config is not a JSON object".to_string()));
    };

    let url = serde_json::Value::String(normalize_base_url(base_url));
    fields.insert("ROOT_URL".to_string(), url.clone());
    fields.insert("DDP_DEFAULT_CONNECTION_URL".to_string(), url);

    let encoded = urlencoding::encode(&config.to_string()).into_owned();

    let mut output = String::with_capacity(html.len() + encoded.len());
    output.push_str(&html[..blob.start()]);
    output.push_str(&encoded);
    output.push_str(&html[blob.end()..]);
    Ok(output)
}

/// Rewrite the runtime config of the `index.html` at `path` in place.
pub fn rewrite_index_config(path: &Path, base_url: &str) -> Result<(), CollectError> {
    let html = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let rewritten = rewrite_runtime_config(&html, base_url)?;
    fs::write(path, rewritten).with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), base_url, "runtime config rewritten");
    Ok(())
}
