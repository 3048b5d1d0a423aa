// src/engine/mod.rs

//! Build session supervision.
//!
//! A build session launches the toolchain once and ends in exactly one
//! [`OutcomeReason`]. Many independent sources race towards that decision:
//! output lines, the readiness poll, the artifact hand-off, four watchdog
//! timers and the process exiting on its own.
//!
//! The pure state machine lives in [`core`]; it never touches timers,
//! processes or the filesystem. The async shell in [`runtime`] owns those
//! resources, feeds their events into the core one at a time and carries out
//! the commands it gets back.

use std::time::Duration;

use crate::types::{OutcomeReason, Stream};

/// Timers that drive a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Watchdog {
    /// Hard cap on the whole session.
    OverallTimeout,
    /// Fires one second after the most recent error line.
    ErrorSettle,
    /// UI heartbeat after the last "still building" line.
    ProgressMessage,
    /// Grace period between a successful copy and killing the toolchain.
    KillGrace,
}

pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(600);
pub const ERROR_SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const PROGRESS_MESSAGE_DELAY: Duration = Duration::from_millis(1500);
pub const KILL_GRACE_DELAY: Duration = Duration::from_millis(500);
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Running,
    /// An outcome has been decided; the toolchain is being terminated.
    Settling(OutcomeReason),
    /// The toolchain is confirmed dead.
    Done(OutcomeReason),
}

/// Events flowing into the session core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Line { stream: Stream, line: String },
    /// The readiness poller saw a fresh build on disk.
    ArtifactsReady,
    /// The artifact hand-off finished.
    CollectionFinished { result: Result<(), String> },
    TimerFired(Watchdog),
    ProcessExited { code: Option<i32> },
}

/// Progress notes for the user; they never change the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressNote {
    Milestone(u8),
    StillBuilding(String),
}

/// Commands produced by the core, executed by the async shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// (Re)arm a watchdog; any pending firing of the same watchdog is
    /// discarded.
    Arm(Watchdog, Duration),
    /// Start copying the build into the desktop app.
    StartCollection,
    Progress(ProgressNote),
    /// Cancel every timer and the readiness poll, persist the transcript if
    /// needed, terminate the toolchain and finish with this reason.
    Settle(OutcomeReason),
}

pub mod core;
pub mod runtime;
pub mod timers;

pub use core::SessionCore;
pub use runtime::{Supervisor, SupervisorOptions};
pub use timers::TimerTable;
