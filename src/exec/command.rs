// src/exec/command.rs

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::ConfigFile;
use crate::paths::AppPaths;

/// Environment the toolchain always runs with: no spinners, no release
/// check.
const BASE_ENV: &[(&str, &str)] = &[
    ("METEOR_PRETTY_OUTPUT", "0"),
    ("METEOR_NO_RELEASE_CHECK", "1"),
];
const DEBUG_ENV: (&str, &str) = ("METEOR_DESKTOP_DEBUG", "1");

/// The toolchain invocation for one build session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainCommand {
    pub program: String,
    /// Arguments passed to the toolchain itself. These are also what the
    /// terminator matches leftover helper processes against.
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: PathBuf,
}

impl ToolchainCommand {
    /// `<program> run --verbose --mobile-server=<url> [--production] -p <port> [--settings <path>]`
    pub fn from_config(cfg: &ConfigFile, paths: &AppPaths) -> Self {
        let mut args = vec![
            "run".to_string(),
            "--verbose".to_string(),
            format!("--mobile-server={}", cfg.build.base_url),
        ];
        if cfg.toolchain.production {
            args.push("--production".to_string());
        }
        args.push("-p".to_string());
        args.push(cfg.build.port.to_string());
        if let Some(settings) = &cfg.toolchain.settings {
            args.push("--settings".to_string());
            args.push(settings.display().to_string());
        }

        let mut env: Vec<(String, String)> = BASE_ENV
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if cfg.toolchain.debug {
            env.push((DEBUG_ENV.0.to_string(), DEBUG_ENV.1.to_string()));
        }

        Self {
            program: cfg.toolchain.program.clone(),
            args,
            env,
            cwd: paths.project_dir.clone(),
        }
    }

    /// Build the platform-appropriate process command.
    ///
    /// The toolchain is a wrapper script on Windows, so it goes through
    /// `cmd /C` there. On Unix it leads its own process group so the whole
    /// tree can be signalled at once.
    pub fn to_command(&self) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.program);
            c
        } else {
            Command::new(&self.program)
        };

        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for arg in &self.args {
            s.push(' ');
            s.push_str(arg);
        }
        s
    }
}
