// src/exec/terminator.rs

//! Killing the toolchain and everything it started.
//!
//! The toolchain is a wrapper around a node process which in turn starts
//! more helpers (a proxy, a database). Killing only the direct child leaves
//! those running.
//!
//! - On Unix the toolchain leads its own process group, so one `SIGKILL` to
//!   the group takes the whole tree down.
//! - On Windows there is no such group signal. We enumerate processes with
//!   the helper image name and kill every one whose command line contains
//!   the toolchain arguments, either plain or quoted.
//!
//! The command-line sweep is also the Unix fallback when the group signal
//! fails. Cleanup is best-effort and never fails because nothing matched.

use anyhow::{Context, Result};
use regex::Regex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::process::Child;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ProcessTerminator {
    args: Vec<String>,
    image_name: String,
}

impl ProcessTerminator {
    /// `args` are the arguments the toolchain was launched with;
    /// `image_name` is the executable name of its helper processes.
    pub fn new(args: Vec<String>, image_name: impl Into<String>) -> Self {
        Self {
            args,
            image_name: image_name.into(),
        }
    }

    /// Kill the child and its descendants, then wait until the child is
    /// confirmed dead.
    pub async fn terminate(&self, child: &mut Child) -> Result<()> {
        let pid = child.id();
        self.kill_tree(pid);

        if let Err(e) = child.start_kill() {
            debug!(error = %e, "toolchain already gone when killing");
        }

        let status = child.wait().await.context("waiting for toolchain to die")?;
        info!(exit_code = ?status.code(), "toolchain terminated");
        Ok(())
    }

    /// Kill everything the toolchain started. `pid` is the toolchain's own
    /// pid, if it is still known.
    pub fn kill_tree(&self, pid: Option<u32>) {
        #[cfg(unix)]
        {
            if let Some(pid) = pid {
                if kill_group(pid) {
                    return;
                }
            }
            self.sweep_matching();
        }

        #[cfg(not(unix))]
        {
            let _ = pid;
            self.sweep_matching();
        }
    }

    /// Kill every process with the helper image name whose command line
    /// matches the toolchain arguments. Returns how many were killed.
    pub fn sweep_matching(&self) -> usize {
        let patterns = match CommandLinePatterns::from_args(&self.args) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "could not build command line patterns; skipping sweep");
                return 0;
            }
        };

        let refresh = ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always);
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh);

        let candidates: Vec<(u32, String)> = system
            .processes()
            .iter()
            .filter(|(_, process)| {
                process
                    .name()
                    .to_string_lossy()
                    .eq_ignore_ascii_case(&self.image_name)
            })
            .map(|(pid, process)| {
                let cmdline = process
                    .cmd()
                    .iter()
                    .map(|part| part.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                (pid.as_u32(), cmdline)
            })
            .collect();

        let mut killed = 0;
        for pid in patterns.matching_pids(&candidates) {
            match system.process(Pid::from_u32(pid)) {
                Some(process) if process.kill() => {
                    debug!(pid, "killed leftover toolchain helper");
                    killed += 1;
                }
                _ => debug!(pid, "leftover toolchain helper already gone"),
            }
        }

        if killed > 0 {
            info!(killed, image = %self.image_name, "killed leftover toolchain helpers");
        }
        killed
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid as NixPid;

    match killpg(NixPid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => {
            debug!(pgid = pid, "sent SIGKILL to toolchain process group");
            true
        }
        // nothing left in the group
        Err(Errno::ESRCH) => true,
        Err(e) => {
            debug!(pgid = pid, error = %e, "could not signal process group");
            false
        }
    }
}

/// Two whitespace-tolerant patterns for the toolchain arguments as they
/// show up in a process table: plain (`run --verbose ...`) and quoted
/// (`"run" "--verbose" ...`), since wrapper scripts may requote them.
#[derive(Debug, Clone)]
pub struct CommandLinePatterns {
    unquoted: Regex,
    quoted: Regex,
}

impl CommandLinePatterns {
    pub fn from_args(args: &[String]) -> Result<Self> {
        anyhow::ensure!(!args.is_empty(), "no arguments to match against");

        let escaped: Vec<String> = args.iter().map(|a| regex::escape(a)).collect();
        let unquoted = format!(r"{}\s*$", escaped.join(r"\s+"));
        let quoted = format!(r#""{}""#, escaped.join(r#""\s+""#));

        Ok(Self {
            unquoted: Regex::new(&unquoted).context("building unquoted pattern")?,
            quoted: Regex::new(&quoted).context("building quoted pattern")?,
        })
    }

    pub fn is_match(&self, cmdline: &str) -> bool {
        self.unquoted.is_match(cmdline) || self.quoted.is_match(cmdline)
    }

    pub fn matching_pids(&self, table: &[(u32, String)]) -> Vec<u32> {
        table
            .iter()
            .filter(|(_, cmdline)| self.is_match(cmdline))
            .map(|(pid, _)| *pid)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Vec<String> {
        ["run", "--verbose", "--mobile-server=http://127.0.0.1:3000", "-p", "3080"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn matches_plain_and_quoted_command_lines() {
        let patterns = CommandLinePatterns::from_args(&args()).unwrap();
        let table = vec![
            (
                101,
                r"C:\meteor\node.exe C:\meteor\tools\index.js run  --verbose --mobile-server=http://127.0.0.1:3000 -p 3080   "
                    .to_string(),
            ),
            (
                102,
                r#""C:\meteor\node.exe" "C:\meteor\tools\index.js" "run" "--verbose" "--mobile-server=http://127.0.0.1:3000" "-p" "3080""#
                    .to_string(),
            ),
            (103, r"C:\meteor\node.exe C:\other\server.js run --verbose".to_string()),
            (
                104,
                r"node.exe index.js run --verbose --mobile-server=http://127.0.0.1:3000 -p 30801"
                    .to_string(),
            ),
        ];

        assert_eq!(patterns.matching_pids(&table), vec![101, 102]);
    }

    #[test]
    fn regex_metacharacters_in_args_are_literal() {
        let patterns = CommandLinePatterns::from_args(&["--settings".to_string(), "a+b.json".to_string()]).unwrap();
        assert!(patterns.is_match("node --settings a+b.json"));
        assert!(!patterns.is_match("node --settings aab.json"));
    }

    #[test]
    fn empty_args_are_rejected() {
        assert!(CommandLinePatterns::from_args(&[]).is_err());
    }

    #[test]
    fn sweep_without_matches_is_harmless() {
        let terminator = ProcessTerminator::new(
            vec!["--no-such-toolchain-arg-7f3a".to_string()],
            "definitely-not-a-real-image",
        );
        assert_eq!(terminator.sweep_matching(), 0);
    }
}
