// src/engine/runtime.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifacts::CollectorBackend;
use crate::classify::LineSignal;
use crate::errors::{CollectError, Result};
use crate::exec::SupervisedProcess;
use crate::fs::FileSystem;
use crate::readiness::{Readiness, ReadinessPoller, ReadinessSnapshot};
use crate::types::{OutcomeReason, Strategy, Stream};

use super::core::SessionCore;
use super::timers::TimerTable;
use super::{ProgressNote, SessionCommand, SessionEvent, READINESS_POLL_INTERVAL};

/// How long a cancelled copy gets to notice before its task is abandoned.
const COLLECTION_STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// How often the artifact directory is checked for a fresh build.
    pub poll_interval: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            poll_interval: READINESS_POLL_INTERVAL,
        }
    }
}

/// What woke the event loop up.
enum Wake {
    Event(Option<SessionEvent>),
    Timers,
    Collected(std::result::Result<(), String>),
    Poll,
}

/// Async shell around [`SessionCore`].
///
/// Owns the toolchain process, the watchdog deadlines, the readiness poll
/// and the artifact hand-off task. Everything it observes is turned into a
/// [`SessionEvent`] and fed to the core, one at a time.
pub struct Supervisor<P: SupervisedProcess, C: CollectorBackend> {
    core: SessionCore,
    options: SupervisorOptions,
    events_rx: mpsc::Receiver<SessionEvent>,
    process: P,
    collector: C,

    readiness: Option<ReadinessPoller>,
    snapshot: Option<ReadinessSnapshot>,

    transcript_sink: Option<(Arc<dyn FileSystem>, PathBuf)>,
    transcript: String,

    timers: TimerTable,
    poll: Option<Interval>,
    collection: Option<JoinHandle<std::result::Result<(), CollectError>>>,
    collection_cancel: Option<CancellationToken>,
}

impl<P: SupervisedProcess, C: CollectorBackend> fmt::Debug for Supervisor<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("core", &self.core)
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}

impl<P: SupervisedProcess, C: CollectorBackend> Supervisor<P, C> {
    pub fn new(
        core: SessionCore,
        events_rx: mpsc::Receiver<SessionEvent>,
        process: P,
        collector: C,
    ) -> Self {
        Self {
            core,
            options: SupervisorOptions::default(),
            events_rx,
            process,
            collector,
            readiness: None,
            snapshot: None,
            transcript_sink: None,
            transcript: String::new(),
            timers: TimerTable::new(),
            poll: None,
            collection: None,
            collection_cancel: None,
        }
    }

    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    /// Poll the artifact directory for readiness. `stale` is the manifest
    /// that was on disk before the toolchain started, if any.
    pub fn with_readiness(mut self, poller: ReadinessPoller, stale: Option<ReadinessSnapshot>) -> Self {
        self.readiness = Some(poller);
        self.snapshot = stale;
        self
    }

    /// Write the toolchain transcript to `log_file` when the build fails.
    pub fn with_transcript(mut self, fs: Arc<dyn FileSystem>, log_file: impl Into<PathBuf>) -> Self {
        self.transcript_sink = Some((fs, log_file.into()));
        self
    }

    /// Run the session until it settles and the toolchain is dead.
    ///
    /// Returns the session's single outcome; `Err` is reserved for failures
    /// of the supervisor itself.
    pub async fn run(mut self) -> Result<OutcomeReason> {
        let strategy = self.core.strategy();
        info!(%strategy, "build session started");

        let commands = self.core.start();
        self.execute_all(commands).await;

        if strategy == Strategy::FromArtifactDirectory && self.readiness.is_some() {
            let mut poll = interval(self.options.poll_interval);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.poll = Some(poll);
        }

        let mut events_open = true;

        while !self.core.is_settled() {
            let deadline = self.timers.next_deadline();

            // Deadlines go first so a chatty toolchain cannot hold off a
            // watchdog; lines already queued are drained on settle.
            let wake = tokio::select! {
                biased;

                _ = sleep_until_deadline(deadline) => Wake::Timers,
                event = self.events_rx.recv(), if events_open => Wake::Event(event),
                result = join_collection(&mut self.collection) => Wake::Collected(result),
                _ = tick(&mut self.poll) => Wake::Poll,
            };

            match wake {
                Wake::Event(Some(event)) => self.dispatch(event).await,
                Wake::Event(None) => {
                    // Every producer is gone, so the process is too.
                    debug!("session event channel closed");
                    events_open = false;
                    self.dispatch(SessionEvent::ProcessExited { code: None }).await;
                }
                Wake::Timers => {
                    for watchdog in self.timers.take_expired(Instant::now()) {
                        debug!(?watchdog, "watchdog fired");
                        self.dispatch(SessionEvent::TimerFired(watchdog)).await;
                    }
                }
                Wake::Collected(result) => {
                    if let Err(ref e) = result {
                        warn!(error = %e, "copying the build failed");
                    }
                    self.dispatch(SessionEvent::CollectionFinished { result }).await;
                }
                Wake::Poll => self.poll_readiness().await,
            }
        }

        let outcome = self
            .core
            .outcome()
            .unwrap_or(OutcomeReason::UnexpectedExit);
        info!(%outcome, "build session finished");
        Ok(outcome)
    }

    async fn dispatch(&mut self, event: SessionEvent) {
        if let SessionEvent::Line { stream, line } = &event {
            self.record(*stream, line);
            let flagged = self
                .core
                .classifier()
                .classify(*stream, line)
                .iter()
                .any(|s| matches!(s, LineSignal::AppError | LineSignal::GenericError));
            if flagged {
                warn!(%stream, "{line}");
            } else {
                debug!(%stream, "{line}");
            }
        }

        let commands = self.core.step(event);
        self.execute_all(commands).await;
    }

    async fn execute_all(&mut self, commands: Vec<SessionCommand>) {
        for command in commands {
            self.execute(command).await;
        }
    }

    async fn execute(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Arm(watchdog, delay) => {
                self.timers.arm(watchdog, Instant::now(), delay);
            }
            SessionCommand::StartCollection => {
                info!("build is ready; copying it into the desktop app");
                let cancel = CancellationToken::new();
                self.collection = Some(tokio::spawn(self.collector.collect(cancel.clone())));
                self.collection_cancel = Some(cancel);
            }
            SessionCommand::Progress(ProgressNote::Milestone(percent)) => {
                info!(percent, "build progress");
            }
            SessionCommand::Progress(ProgressNote::StillBuilding(note)) => {
                info!("{note}...");
            }
            SessionCommand::Settle(reason) => self.settle(reason).await,
        }
    }

    async fn poll_readiness(&mut self) {
        let Some(poller) = &self.readiness else {
            return;
        };

        if let Readiness::Ready(snapshot) = poller.poll(self.core.strategy(), self.snapshot.as_ref()) {
            self.snapshot = Some(snapshot);
            self.dispatch(SessionEvent::ArtifactsReady).await;
        }
    }

    fn record(&mut self, stream: Stream, line: &str) {
        self.transcript.push_str(&format!("[{stream}] {line}\n"));
    }

    /// Carry out the settlement the core decided on.
    async fn settle(&mut self, reason: OutcomeReason) {
        info!(%reason, "settling build session");

        self.timers.cancel_all();
        self.poll = None;

        // Keep whatever the toolchain printed before the decision.
        self.events_rx.close();
        while let Ok(event) = self.events_rx.try_recv() {
            if let SessionEvent::Line { stream, line } = event {
                self.record(stream, &line);
            }
        }

        if reason.persists_log() {
            self.persist_transcript();
        }

        if let Some(cancel) = self.collection_cancel.take() {
            cancel.cancel();
        }

        if let Err(e) = self.process.terminate().await {
            warn!(error = %e, "terminating the toolchain failed");
        }

        self.stop_collection().await;
        self.core.finish();
    }

    /// Wait for a cancelled copy to stop touching the output directory.
    async fn stop_collection(&mut self) {
        let Some(mut collection) = self.collection.take() else {
            return;
        };
        if collection.is_finished() {
            return;
        }

        debug!("waiting for the cancelled artifact copy to stop");
        match timeout(COLLECTION_STOP_GRACE, &mut collection).await {
            Ok(Ok(Err(CollectError::Cancelled))) | Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => debug!(error = %e, "artifact copy ended with an error after settling"),
            Ok(Err(e)) => warn!(error = %e, "artifact copy task failed"),
            Err(_) => {
                warn!("artifact copy ignored cancellation; abandoning it");
                collection.abort();
            }
        }
    }

    fn persist_transcript(&self) {
        let Some((fs, log_file)) = &self.transcript_sink else {
            return;
        };
        match fs.write(log_file, self.transcript.as_bytes()) {
            Ok(()) => info!(path = %log_file.display(), "toolchain output written"),
            Err(e) => warn!(path = %log_file.display(), error = %e, "could not write toolchain output"),
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(poll) => {
            poll.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn join_collection(
    handle: &mut Option<JoinHandle<std::result::Result<(), CollectError>>>,
) -> std::result::Result<(), String> {
    let Some(task) = handle.as_mut() else {
        return std::future::pending().await;
    };
    let joined = task.await;
    *handle = None;
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(format!("artifact copy task failed: {e}")),
    }
}
