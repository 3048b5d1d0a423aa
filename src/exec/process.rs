// src/exec/process.rs

//! The running toolchain process.
//!
//! [`spawn_toolchain`] starts the toolchain and three background tasks:
//! one reader per output stream and a watcher that owns the `Child`. Lines
//! and the final exit all travel over the same session event channel, and
//! the exit is only sent after both readers have drained, so the supervisor
//! always sees the last output line before the exit.
//!
//! The watcher either observes the process exiting on its own, or receives
//! a kill request from [`ToolchainProcess::terminate`] and runs the
//! [`ProcessTerminator`]. This mirrors running a cancellable task process:
//! `select!` between the child exiting and a cancel channel.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::engine::SessionEvent;
use crate::types::Stream;

use super::command::ToolchainCommand;
use super::terminator::ProcessTerminator;

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long to wait for output readers after the process exited; helpers
/// that inherited the pipes may keep them open.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The seam through which the supervisor ends the toolchain.
///
/// Production code uses [`ToolchainProcess`]; tests provide a fake that
/// records the call.
pub trait SupervisedProcess: Send {
    /// Kill the toolchain (and its helpers) and resolve once it is dead.
    fn terminate(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchEnd {
    /// The process exited by itself.
    Exited,
    /// The process was killed on request.
    Killed,
}

pub struct ToolchainProcess {
    pid: Option<u32>,
    terminator: ProcessTerminator,
    kill_tx: Option<oneshot::Sender<()>>,
    watcher: Option<JoinHandle<Result<WatchEnd>>>,
}

impl std::fmt::Debug for ToolchainProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolchainProcess")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Launch the toolchain and start forwarding its output and exit as
/// session events.
pub fn spawn_toolchain(
    command: &ToolchainCommand,
    terminator: ProcessTerminator,
    events: mpsc::Sender<SessionEvent>,
) -> Result<ToolchainProcess> {
    info!(cmd = %command.display(), cwd = %command.cwd.display(), "starting toolchain");

    let mut child = command
        .to_command()
        .spawn()
        .with_context(|| format!("spawning toolchain '{}'", command.program))?;
    let pid = child.id();

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(forward_lines(stdout, Stream::Stdout, events.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(forward_lines(stderr, Stream::Stderr, events.clone()));
    }

    let (kill_tx, kill_rx) = oneshot::channel::<()>();
    let watcher = tokio::spawn(watch_child(
        child,
        readers,
        kill_rx,
        terminator.clone(),
        events,
    ));

    Ok(ToolchainProcess {
        pid,
        terminator,
        kill_tx: Some(kill_tx),
        watcher: Some(watcher),
    })
}

/// Forward every line of `reader` as a [`SessionEvent::Line`].
///
/// Lines are decoded lossily so a stray non-UTF-8 byte from the toolchain
/// does not end the stream.
fn forward_lines<R>(reader: R, stream: Stream, events: mpsc::Sender<SessionEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if events.send(SessionEvent::Line { stream, line }).await.is_err() {
                        debug!(%stream, "session no longer listening; stopping reader");
                        break;
                    }
                }
                Err(e) => {
                    debug!(%stream, error = %e, "error reading toolchain output");
                    break;
                }
            }
        }

        debug!(%stream, "toolchain output reader ended");
    })
}

async fn watch_child(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    mut kill_rx: oneshot::Receiver<()>,
    terminator: ProcessTerminator,
    events: mpsc::Sender<SessionEvent>,
) -> Result<WatchEnd> {
    tokio::select! {
        status = child.wait() => {
            let status = status.context("waiting for toolchain process")?;
            drain(readers).await;

            info!(
                exit_code = ?status.code(),
                success = status.success(),
                "toolchain exited"
            );
            let _ = events
                .send(SessionEvent::ProcessExited { code: status.code() })
                .await;
            Ok(WatchEnd::Exited)
        }

        request = &mut kill_rx => {
            match request {
                Ok(()) => {
                    info!("kill requested; terminating toolchain");
                    terminator.terminate(&mut child).await?;
                }
                Err(_) => {
                    // Handle dropped without a request; kill_on_drop takes over.
                    debug!("toolchain handle dropped");
                }
            }
            for reader in readers {
                reader.abort();
            }
            Ok(WatchEnd::Killed)
        }
    }
}

async fn drain(readers: Vec<JoinHandle<()>>) {
    for mut reader in readers {
        if timeout(DRAIN_TIMEOUT, &mut reader).await.is_err() {
            debug!("output reader still open after exit; abandoning it");
            reader.abort();
        }
    }
}

impl ToolchainProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl SupervisedProcess for ToolchainProcess {
    fn terminate(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if let Some(kill_tx) = self.kill_tx.take() {
                if kill_tx.send(()).is_err() {
                    debug!("toolchain watcher already finished");
                }
            }

            let end = match self.watcher.take() {
                Some(watcher) => watcher
                    .await
                    .map_err(|e| anyhow!("toolchain watcher task failed: {e}"))??,
                None => WatchEnd::Exited,
            };

            if end == WatchEnd::Exited {
                // The toolchain is gone but its helpers may not be.
                self.terminator.kill_tree(self.pid);
            }
            Ok(())
        })
    }
}

impl Drop for ToolchainProcess {
    fn drop(&mut self) {
        // Dropped without terminate(), e.g. on Ctrl-C.
        if self.watcher.is_some() {
            warn!(pid = ?self.pid, "toolchain handle dropped while running; killing it");
            self.terminator.kill_tree(self.pid);
        }
    }
}
