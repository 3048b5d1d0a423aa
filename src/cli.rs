// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `cordova-harvest`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cordova-harvest",
    version,
    about = "Build a Meteor app's web.cordova bundle and copy it into a desktop app.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Harvest.toml` in the current working directory. Built-in
    /// defaults are used when the default file does not exist.
    #[arg(long, value_name = "PATH", default_value = "Harvest.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `HARVEST_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Resolve the strategy, command line and paths, but don't launch
    /// anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Always harvest from the cordova build directory.
    #[arg(long)]
    pub force_cordova_build: bool,

    /// Build with `--production`.
    #[arg(long)]
    pub production: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse() {
        let args = CliArgs::try_parse_from([
            "cordova-harvest",
            "--config",
            "desktop/Harvest.toml",
            "--log-level",
            "debug",
            "--force-cordova-build",
            "--production",
        ])
        .unwrap();

        assert_eq!(args.config, "desktop/Harvest.toml");
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(args.force_cordova_build);
        assert!(args.production);
        assert!(!args.dry_run);
    }
}
