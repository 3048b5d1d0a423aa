// src/lib.rs

pub mod artifacts;
pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod paths;
pub mod readiness;
pub mod strategy;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::artifacts::{ArtifactCollector, DebugEndpoint};
use crate::classify::OutputClassifier;
use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, defaults_with_env, load_and_validate};
use crate::config::ConfigFile;
use crate::engine::{SessionCore, Supervisor};
use crate::errors::{HarvestError, Result};
use crate::exec::{spawn_toolchain, ProcessTerminator, ToolchainCommand, EVENT_CHANNEL_CAPACITY};
use crate::fs::{FileSystem, RealFileSystem};
use crate::paths::AppPaths;
use crate::readiness::ReadinessPoller;
use crate::types::Strategy;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - strategy selection from the app's toolchain release
/// - the supervised build session and the artifact hand-off
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_config(&config_path)?;

    if args.force_cordova_build {
        cfg.build.force_cordova_build = true;
    }
    if args.production {
        cfg.toolchain.production = true;
    }

    let paths = cfg.paths(&config_root_dir(&config_path));
    let release = read_release(&cfg, &paths)?;
    if !strategy::is_supported(&release) {
        warn!(
            release = %release,
            minimum = %strategy::MINIMUM_SUPPORTED,
            "toolchain release is older than the oldest supported one; the build may fail"
        );
    }

    let strategy = strategy::select(&release, cfg.build.force_cordova_build);
    let command = ToolchainCommand::from_config(&cfg, &paths);
    info!(%strategy, release = %release, "harvest planned");

    if args.dry_run {
        print_dry_run(&cfg, &paths, &release, strategy, &command);
        return Ok(());
    }

    harvest(&cfg, &paths, strategy, &command).await
}

/// Run one build session and collect its output.
pub async fn harvest(
    cfg: &ConfigFile,
    paths: &AppPaths,
    strategy: Strategy,
    command: &ToolchainCommand,
) -> Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    // Whatever is on disk now belongs to an earlier build.
    let poller = ReadinessPoller::new(fs.clone(), paths.clone());
    let stale = poller.capture_existing();

    let collector = ArtifactCollector::new(
        strategy,
        paths.clone(),
        cfg.build.base_url.clone(),
        DebugEndpoint::local(cfg.build.port),
    )?;

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let terminator = ProcessTerminator::new(command.args.clone(), cfg.toolchain.descendant_image.clone());
    let process = spawn_toolchain(command, terminator, events_tx)?;

    let core = SessionCore::new(
        strategy,
        OutputClassifier::new(cfg.toolchain.ignore_stderr.clone()),
        cfg.overall_timeout(),
    );
    let supervisor = Supervisor::new(core, events_rx, process, collector)
        .with_readiness(poller, stale)
        .with_transcript(fs, paths.log_file.clone());

    let outcome = tokio::select! {
        outcome = supervisor.run() => outcome?,
        _ = tokio::signal::ctrl_c() => {
            // Dropping the session kills the toolchain tree.
            warn!("interrupted; stopping the toolchain");
            return Err(HarvestError::Other(anyhow!("interrupted by Ctrl-C")));
        }
    };

    if outcome.is_success() {
        info!(output = %paths.output_dir.display(), "{}", outcome.describe(cfg.build.port));
        return Ok(());
    }

    error!(reason = %outcome, "{}", outcome.describe(cfg.build.port));
    if outcome.persists_log() {
        error!(log = %paths.log_file.display(), "toolchain output saved for inspection");
    }
    Err(HarvestError::Build(outcome))
}

/// Load the config file, or fall back to built-in defaults when the default
/// file simply isn't there.
fn load_config(config_path: &Path) -> Result<ConfigFile> {
    if config_path.exists() {
        return load_and_validate(config_path);
    }
    if config_path == default_config_path() {
        debug!(path = %config_path.display(), "no config file; using defaults");
        return defaults_with_env();
    }
    Err(HarvestError::ConfigError(format!(
        "config file {} does not exist",
        config_path.display()
    )))
}

/// The release the app is pinned to: the config override, or the first
/// line of `.meteor/release`.
fn read_release(cfg: &ConfigFile, paths: &AppPaths) -> Result<String> {
    if let Some(release) = &cfg.toolchain.release {
        return Ok(release.trim().to_string());
    }

    let release_file = paths.release_file();
    let contents = std::fs::read_to_string(&release_file).map_err(|e| {
        HarvestError::ConfigError(format!(
            "could not read {} ({e}); is [build].project_dir a Meteor app?",
            release_file.display()
        ))
    })?;

    Ok(contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .unwrap_or_default()
        .to_string())
}

/// Figure out the directory relative config paths are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "desktop/Harvest.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Harvest.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Dry-run output: what would be launched, and where things would go.
fn print_dry_run(
    cfg: &ConfigFile,
    paths: &AppPaths,
    release: &str,
    strategy: Strategy,
    command: &ToolchainCommand,
) {
    println!("cordova-harvest dry-run");
    println!("  release  = {release}");
    println!("  strategy = {strategy}");
    if cfg.build.force_cordova_build {
        println!("             (forced by force_cordova_build)");
    }
    println!();

    println!("toolchain:");
    println!("  cmd: {}", command.display());
    println!("  cwd: {}", command.cwd.display());
    for (key, value) in &command.env {
        println!("  env: {key}={value}");
    }
    println!("  timeout: {}s", cfg.build.timeout_secs);
    println!();

    println!("paths:");
    println!("  build dir: {}", paths.build_dir.display());
    println!("  output:    {}", paths.output_dir.display());
    println!("  log file:  {}", paths.log_file.display());
    if strategy == Strategy::FromRunningServer {
        println!("  fetch:     {}", DebugEndpoint::local(cfg.build.port).index_url());
    }

    debug!("dry-run complete (no execution)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfigFile;

    #[test]
    fn release_comes_from_the_release_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".meteor")).unwrap();
        std::fs::write(tmp.path().join(".meteor/release"), "\n# pinned\nMETEOR@1.4.2.3\n").unwrap();

        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        let paths = AppPaths::new(tmp.path(), tmp.path().join("out"), tmp.path().join("meteor.log"));
        assert_eq!(read_release(&cfg, &paths).unwrap(), "METEOR@1.4.2.3");
    }

    #[test]
    fn release_override_skips_the_file() {
        let mut raw = RawConfigFile::default();
        raw.toolchain.release = Some(" METEOR@1.3.4.2 ".to_string());
        let cfg = ConfigFile::try_from(raw).unwrap();
        let paths = AppPaths::new("/definitely/not/here", "/out", "/log");
        assert_eq!(read_release(&cfg, &paths).unwrap(), "METEOR@1.3.4.2");
    }

    #[test]
    fn missing_release_file_is_a_config_error() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        let paths = AppPaths::new("/definitely/not/here", "/out", "/log");
        assert!(matches!(read_release(&cfg, &paths), Err(HarvestError::ConfigError(_))));
    }

    #[test]
    fn bare_config_name_resolves_against_cwd() {
        assert_eq!(
            config_root_dir(Path::new("desktop/Harvest.toml")),
            PathBuf::from("desktop")
        );
        assert!(config_root_dir(Path::new("Harvest.toml")).is_absolute());
    }
}
