// tests/toolchain_process.rs
//
// Real child processes through `sh`, supervised end to end.

#![cfg(unix)]

mod common;
use crate::common::fakes::FakeCollector;
use crate::common::{init_tracing, TestResult};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::sync::mpsc;

use cordova_harvest::classify::OutputClassifier;
use cordova_harvest::engine::{SessionCore, Supervisor};
use cordova_harvest::exec::{spawn_toolchain, ProcessTerminator, ToolchainCommand, EVENT_CHANNEL_CAPACITY};
use cordova_harvest::fs::RealFileSystem;
use cordova_harvest::types::{OutcomeReason, Strategy};

fn shell(script: &str, cwd: &Path, env: &[(&str, String)]) -> ToolchainCommand {
    ToolchainCommand {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        env: env.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        cwd: cwd.to_path_buf(),
    }
}

fn is_gone(pid: i32) -> bool {
    matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH))
}

/// Run `command` under a supervisor with a fake collector. Returns the
/// outcome and the toolchain's pid.
async fn supervise(command: &ToolchainCommand, log_file: &Path) -> Result<(OutcomeReason, u32), Box<dyn std::error::Error>> {
    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let terminator = ProcessTerminator::new(command.args.clone(), "sh");
    let process = spawn_toolchain(command, terminator, events_tx)?;
    let pid = process.pid().ok_or("toolchain has no pid")?;

    let core = SessionCore::new(
        Strategy::FromArtifactDirectory,
        OutputClassifier::default(),
        Duration::from_secs(30),
    );
    let supervisor = Supervisor::new(core, events_rx, process, FakeCollector::succeeding(Duration::ZERO))
        .with_transcript(Arc::new(RealFileSystem), log_file);

    let outcome = supervisor.run().await?;
    Ok((outcome, pid))
}

#[tokio::test]
async fn error_output_kills_a_running_toolchain() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let log_file = tmp.path().join("meteor.log");
    let command = shell("echo 'Error: cannot build' >&2; sleep 300", tmp.path(), &[]);

    let (outcome, pid) = common::with_timeout(supervise(&command, &log_file)).await?;

    assert_eq!(outcome, OutcomeReason::ErrorOutput);
    assert!(is_gone(pid as i32), "toolchain {pid} still alive");

    let log = std::fs::read_to_string(&log_file)?;
    assert!(log.contains("[stderr] Error: cannot build"));
    Ok(())
}

#[tokio::test]
async fn early_exit_keeps_the_last_lines() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let log_file = tmp.path().join("meteor.log");
    let command = shell("echo hi; echo bye; exit 3", tmp.path(), &[]);

    let (outcome, _) = common::with_timeout(supervise(&command, &log_file)).await?;

    assert_eq!(outcome, OutcomeReason::UnexpectedExit);
    let log = std::fs::read_to_string(&log_file)?;
    assert_eq!(log, "[stdout] hi\n[stdout] bye\n");
    Ok(())
}

#[tokio::test]
async fn port_conflict_is_reported_on_exit() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let log_file = tmp.path().join("meteor.log");
    let command = shell(
        "echo \"Can't listen on port 3080. Perhaps another Meteor is running?\"; exit 254",
        tmp.path(),
        &[],
    );

    let (outcome, _) = common::with_timeout(supervise(&command, &log_file)).await?;

    assert_eq!(outcome, OutcomeReason::PortConflict);
    assert!(log_file.is_file());
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn helpers_die_with_the_toolchain() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let log_file = tmp.path().join("meteor.log");
    let pid_file = tmp.path().join("helper.pid");
    let command = shell(
        "sleep 300 & echo $! > \"$HELPER_PID_FILE\"; echo 'Error: helper started' >&2; wait",
        tmp.path(),
        &[("HELPER_PID_FILE", pid_file.display().to_string())],
    );

    let (outcome, _) = common::with_timeout(supervise(&command, &log_file)).await?;
    assert_eq!(outcome, OutcomeReason::ErrorOutput);

    let helper: i32 = std::fs::read_to_string(&pid_file)?.trim().parse()?;

    // The orphaned helper is reaped by init eventually; a zombie is dead enough.
    let mut dead = false;
    for _ in 0..50 {
        let stat = std::fs::read_to_string(format!("/proc/{helper}/stat")).unwrap_or_default();
        let state = stat.rsplit(')').next().and_then(|rest| rest.split_whitespace().next());
        if matches!(state, None | Some("Z") | Some("X")) {
            dead = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(dead, "helper {helper} survived the toolchain");
    Ok(())
}
