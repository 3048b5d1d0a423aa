// src/engine/core.rs

//! Pure session state machine.
//!
//! [`SessionCore`] consumes [`SessionEvent`]s one at a time and returns the
//! [`SessionCommand`]s the async shell should carry out. It owns every flag
//! the decision depends on (`desired_exit`, `port_problem`, the pending error
//! kind, the hand-off state and the set of armed watchdogs) and has no
//! channels, no Tokio types and no IO.
//!
//! Settlement goes through a single guard: the first trigger that finds the
//! session `Running` moves it to `Settling` and emits the one and only
//! [`SessionCommand::Settle`]. Every later event is a no-op.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::classify::{LineSignal, OutputClassifier, Progress};
use crate::types::{OutcomeReason, Strategy, Stream};

use super::{
    ProgressNote, SessionCommand, SessionEvent, SessionPhase, Watchdog, ERROR_SETTLE_DELAY,
    KILL_GRACE_DELAY, PROGRESS_MESSAGE_DELAY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandOff {
    NotStarted,
    Collecting,
    Collected,
}

#[derive(Debug)]
pub struct SessionCore {
    strategy: Strategy,
    classifier: OutputClassifier,
    overall_timeout: Duration,
    phase: SessionPhase,
    /// Set right before the supervisor kills the toolchain, so its exit is
    /// not reported as unexpected.
    desired_exit: bool,
    port_problem: bool,
    /// Reason the armed error timer will settle with.
    pending_error: Option<OutcomeReason>,
    hand_off: HandOff,
    armed: BTreeSet<Watchdog>,
    last_heartbeat: Option<String>,
}

impl SessionCore {
    pub fn new(strategy: Strategy, classifier: OutputClassifier, overall_timeout: Duration) -> Self {
        Self {
            strategy,
            classifier,
            overall_timeout,
            phase: SessionPhase::Idle,
            desired_exit: false,
            port_problem: false,
            pending_error: None,
            hand_off: HandOff::NotStarted,
            armed: BTreeSet::new(),
            last_heartbeat: None,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.phase, SessionPhase::Settling(_) | SessionPhase::Done(_))
    }

    pub fn outcome(&self) -> Option<OutcomeReason> {
        match self.phase {
            SessionPhase::Settling(reason) | SessionPhase::Done(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn desired_exit(&self) -> bool {
        self.desired_exit
    }

    pub fn classifier(&self) -> &OutputClassifier {
        &self.classifier
    }

    pub fn port_problem(&self) -> bool {
        self.port_problem
    }

    /// Watchdogs the core currently considers armed.
    pub fn armed(&self) -> impl Iterator<Item = Watchdog> + '_ {
        self.armed.iter().copied()
    }

    /// The toolchain has been launched: `Idle -> Running`.
    pub fn start(&mut self) -> Vec<SessionCommand> {
        if self.phase != SessionPhase::Idle {
            return Vec::new();
        }
        self.phase = SessionPhase::Running;
        vec![self.arm(Watchdog::OverallTimeout, self.overall_timeout)]
    }

    /// The toolchain is confirmed dead: `Settling -> Done`.
    pub fn finish(&mut self) {
        if let SessionPhase::Settling(reason) = self.phase {
            self.phase = SessionPhase::Done(reason);
        }
    }

    /// Handle a single event, returning the commands for the shell.
    pub fn step(&mut self, event: SessionEvent) -> Vec<SessionCommand> {
        if self.phase != SessionPhase::Running {
            return Vec::new();
        }

        match event {
            SessionEvent::Line { stream, line } => self.handle_line(stream, line),
            SessionEvent::ArtifactsReady => {
                if self.strategy == Strategy::FromArtifactDirectory {
                    self.begin_hand_off()
                } else {
                    Vec::new()
                }
            }
            SessionEvent::CollectionFinished { result } => self.handle_collection(result),
            SessionEvent::TimerFired(watchdog) => self.handle_timer(watchdog),
            SessionEvent::ProcessExited { .. } => self.handle_exit(),
        }
    }

    fn handle_line(&mut self, stream: Stream, line: String) -> Vec<SessionCommand> {
        let mut commands = Vec::new();

        for signal in self.classifier.classify(stream, &line) {
            match signal {
                LineSignal::Progress(Progress::Milestone(pct)) => {
                    commands.push(SessionCommand::Progress(ProgressNote::Milestone(pct)));
                }
                LineSignal::Progress(Progress::Heartbeat) => {
                    self.last_heartbeat = Some(line.trim().to_string());
                    commands.push(self.arm(Watchdog::ProgressMessage, PROGRESS_MESSAGE_DELAY));
                }
                LineSignal::AppError => {
                    self.pending_error = Some(OutcomeReason::AppError);
                    commands.push(self.arm(Watchdog::ErrorSettle, ERROR_SETTLE_DELAY));
                }
                LineSignal::GenericError => {
                    // A pending app error is the more specific diagnosis.
                    if self.pending_error != Some(OutcomeReason::AppError) {
                        self.pending_error = Some(OutcomeReason::ErrorOutput);
                        commands.push(self.arm(Watchdog::ErrorSettle, ERROR_SETTLE_DELAY));
                    }
                }
                LineSignal::PortConflict => {
                    self.port_problem = true;
                }
                LineSignal::ServerUp => {
                    if self.strategy == Strategy::FromRunningServer {
                        commands.extend(self.begin_hand_off());
                    }
                }
            }
        }

        commands
    }

    /// Start the artifact hand-off unless one is already under way or an
    /// error is about to settle the session anyway.
    fn begin_hand_off(&mut self) -> Vec<SessionCommand> {
        if self.hand_off != HandOff::NotStarted || self.pending_error.is_some() {
            return Vec::new();
        }
        self.hand_off = HandOff::Collecting;
        vec![SessionCommand::StartCollection]
    }

    fn handle_collection(&mut self, result: Result<(), String>) -> Vec<SessionCommand> {
        if self.hand_off != HandOff::Collecting {
            return Vec::new();
        }
        match result {
            Ok(()) => {
                self.hand_off = HandOff::Collected;
                vec![self.arm(Watchdog::KillGrace, KILL_GRACE_DELAY)]
            }
            Err(_) => self.settle(OutcomeReason::CopyFailure),
        }
    }

    fn handle_timer(&mut self, watchdog: Watchdog) -> Vec<SessionCommand> {
        // A timer that is not armed was cancelled or already fired.
        if !self.armed.remove(&watchdog) {
            return Vec::new();
        }

        match watchdog {
            Watchdog::OverallTimeout => self.settle(OutcomeReason::Timeout),
            Watchdog::ErrorSettle => {
                let reason = self.pending_error.unwrap_or(OutcomeReason::ErrorOutput);
                self.settle(reason)
            }
            Watchdog::KillGrace => self.settle(OutcomeReason::Success),
            Watchdog::ProgressMessage => {
                let note = self
                    .last_heartbeat
                    .clone()
                    .unwrap_or_else(|| "still building".to_string());
                vec![SessionCommand::Progress(ProgressNote::StillBuilding(note))]
            }
        }
    }

    fn handle_exit(&mut self) -> Vec<SessionCommand> {
        if self.desired_exit {
            return Vec::new();
        }
        let reason = if self.port_problem {
            OutcomeReason::PortConflict
        } else {
            OutcomeReason::UnexpectedExit
        };
        self.settle(reason)
    }

    fn arm(&mut self, watchdog: Watchdog, delay: Duration) -> SessionCommand {
        self.armed.insert(watchdog);
        SessionCommand::Arm(watchdog, delay)
    }

    /// The settle guard. Only the first caller gets a `Settle` command.
    fn settle(&mut self, reason: OutcomeReason) -> Vec<SessionCommand> {
        if self.phase != SessionPhase::Running {
            return Vec::new();
        }
        self.phase = SessionPhase::Settling(reason);
        self.desired_exit = true;
        self.armed.clear();
        self.pending_error = None;
        vec![SessionCommand::Settle(reason)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DEFAULT_OVERALL_TIMEOUT;

    fn running(strategy: Strategy) -> SessionCore {
        let mut core = SessionCore::new(strategy, OutputClassifier::default(), DEFAULT_OVERALL_TIMEOUT);
        let cmds = core.start();
        assert_eq!(
            cmds,
            vec![SessionCommand::Arm(Watchdog::OverallTimeout, DEFAULT_OVERALL_TIMEOUT)]
        );
        core
    }

    fn line(stream: Stream, text: &str) -> SessionEvent {
        SessionEvent::Line {
            stream,
            line: text.to_string(),
        }
    }

    fn settles(cmds: &[SessionCommand]) -> Vec<OutcomeReason> {
        cmds.iter()
            .filter_map(|c| match c {
                SessionCommand::Settle(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn events_before_start_are_ignored() {
        let mut core = SessionCore::new(
            Strategy::FromArtifactDirectory,
            OutputClassifier::default(),
            DEFAULT_OVERALL_TIMEOUT,
        );
        assert!(core.step(SessionEvent::ProcessExited { code: Some(1) }).is_empty());
        assert_eq!(core.phase(), SessionPhase::Idle);
    }

    #[test]
    fn stderr_error_settles_once_and_clears_timers() {
        let mut core = running(Strategy::FromArtifactDirectory);

        let cmds = core.step(line(Stream::Stderr, "Error: boom"));
        assert_eq!(cmds, vec![SessionCommand::Arm(Watchdog::ErrorSettle, ERROR_SETTLE_DELAY)]);

        let cmds = core.step(SessionEvent::TimerFired(Watchdog::ErrorSettle));
        assert_eq!(settles(&cmds), vec![OutcomeReason::ErrorOutput]);
        assert_eq!(core.armed().count(), 0);
        assert!(core.desired_exit());

        // a second firing after settlement changes nothing
        assert!(core.step(SessionEvent::TimerFired(Watchdog::ErrorSettle)).is_empty());
        assert!(core.step(SessionEvent::TimerFired(Watchdog::OverallTimeout)).is_empty());
        assert!(core.step(SessionEvent::ProcessExited { code: None }).is_empty());
        assert_eq!(core.outcome(), Some(OutcomeReason::ErrorOutput));

        core.finish();
        assert_eq!(core.phase(), SessionPhase::Done(OutcomeReason::ErrorOutput));
    }

    #[test]
    fn app_error_is_not_downgraded_by_later_generic_errors() {
        let mut core = running(Strategy::FromArtifactDirectory);
        core.step(line(Stream::Stdout, "=> Your application has errors. Waiting for file change."));
        let cmds = core.step(line(Stream::Stderr, "some trailing stack frame"));
        assert!(cmds.is_empty(), "generic error must not re-arm a pending app error");

        let cmds = core.step(SessionEvent::TimerFired(Watchdog::ErrorSettle));
        assert_eq!(settles(&cmds), vec![OutcomeReason::AppError]);
    }

    #[test]
    fn port_conflict_then_exit() {
        let mut core = running(Strategy::FromRunningServer);
        assert!(core.step(line(Stream::Stdout, "Can't listen on port 3080.")).is_empty());
        assert!(core.port_problem());

        let cmds = core.step(SessionEvent::ProcessExited { code: Some(254) });
        assert_eq!(settles(&cmds), vec![OutcomeReason::PortConflict]);
    }

    #[test]
    fn plain_exit_is_unexpected() {
        let mut core = running(Strategy::FromArtifactDirectory);
        let cmds = core.step(SessionEvent::ProcessExited { code: Some(0) });
        assert_eq!(settles(&cmds), vec![OutcomeReason::UnexpectedExit]);
    }

    #[test]
    fn overall_timeout() {
        let mut core = running(Strategy::FromArtifactDirectory);
        let cmds = core.step(SessionEvent::TimerFired(Watchdog::OverallTimeout));
        assert_eq!(settles(&cmds), vec![OutcomeReason::Timeout]);
        assert!(core.step(SessionEvent::ArtifactsReady).is_empty());
    }

    #[test]
    fn readiness_leads_to_success_after_kill_grace() {
        let mut core = running(Strategy::FromArtifactDirectory);

        assert_eq!(core.step(SessionEvent::ArtifactsReady), vec![SessionCommand::StartCollection]);
        // further readiness while collecting is ignored
        assert!(core.step(SessionEvent::ArtifactsReady).is_empty());

        let cmds = core.step(SessionEvent::CollectionFinished { result: Ok(()) });
        assert_eq!(cmds, vec![SessionCommand::Arm(Watchdog::KillGrace, KILL_GRACE_DELAY)]);

        let cmds = core.step(SessionEvent::TimerFired(Watchdog::KillGrace));
        assert_eq!(settles(&cmds), vec![OutcomeReason::Success]);
    }

    #[test]
    fn failed_collection_is_a_copy_failure() {
        let mut core = running(Strategy::FromArtifactDirectory);
        core.step(SessionEvent::ArtifactsReady);
        let cmds = core.step(SessionEvent::CollectionFinished {
            result: Err("missing index.html".to_string()),
        });
        assert_eq!(settles(&cmds), vec![OutcomeReason::CopyFailure]);
    }

    #[test]
    fn server_marker_only_counts_for_server_strategy() {
        let mut core = running(Strategy::FromArtifactDirectory);
        assert!(core.step(line(Stream::Stdout, "=> App running at: http://localhost:3080/")).is_empty());

        let mut core = running(Strategy::FromRunningServer);
        assert!(core.step(SessionEvent::ArtifactsReady).is_empty());
        assert_eq!(
            core.step(line(Stream::Stdout, "=> App running at: http://localhost:3080/")),
            vec![SessionCommand::StartCollection]
        );
    }

    #[test]
    fn pending_error_blocks_hand_off() {
        let mut core = running(Strategy::FromArtifactDirectory);
        core.step(line(Stream::Stderr, "Error: boom"));
        assert!(core.step(SessionEvent::ArtifactsReady).is_empty());

        let cmds = core.step(SessionEvent::TimerFired(Watchdog::ErrorSettle));
        assert_eq!(settles(&cmds), vec![OutcomeReason::ErrorOutput]);
    }

    #[test]
    fn error_during_collection_races_the_kill_grace() {
        // collection started first, error arrives while copying
        let mut core = running(Strategy::FromArtifactDirectory);
        core.step(SessionEvent::ArtifactsReady);
        core.step(line(Stream::Stderr, "Error: late"));
        core.step(SessionEvent::CollectionFinished { result: Ok(()) });

        // kill grace reaches the guard first
        let cmds = core.step(SessionEvent::TimerFired(Watchdog::KillGrace));
        assert_eq!(settles(&cmds), vec![OutcomeReason::Success]);
        assert!(core.step(SessionEvent::TimerFired(Watchdog::ErrorSettle)).is_empty());
        assert_eq!(core.outcome(), Some(OutcomeReason::Success));
    }

    #[test]
    fn heartbeat_rearms_progress_message_and_reports_last_line() {
        let mut core = running(Strategy::FromArtifactDirectory);
        let cmds = core.step(line(Stream::Stdout, "  Preparing Cordova project for platform Android  "));
        assert_eq!(
            cmds,
            vec![SessionCommand::Arm(Watchdog::ProgressMessage, PROGRESS_MESSAGE_DELAY)]
        );

        let cmds = core.step(SessionEvent::TimerFired(Watchdog::ProgressMessage));
        assert_eq!(
            cmds,
            vec![SessionCommand::Progress(ProgressNote::StillBuilding(
                "Preparing Cordova project for platform Android".to_string()
            ))]
        );
        assert!(!core.is_settled());
    }
}
