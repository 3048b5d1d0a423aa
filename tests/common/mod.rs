#![allow(dead_code)]

pub use harvest_test_utils::{builders, fakes, fixtures, init_tracing, with_timeout};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use cordova_harvest::classify::OutputClassifier;
use cordova_harvest::engine::{SessionCore, SessionEvent, Supervisor};
use cordova_harvest::fs::mock::MockFileSystem;
use cordova_harvest::types::{Strategy, Stream};

use self::fakes::{FakeCollector, FakeProcess};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const LOG_FILE: &str = "/app/meteor.log";

/// A supervisor around fakes, plus the handles a test needs to drive and
/// inspect it.
pub struct Harness {
    pub events: mpsc::Sender<SessionEvent>,
    pub process: FakeProcess,
    pub collector: FakeCollector,
    pub fs: MockFileSystem,
    pub supervisor: Supervisor<FakeProcess, FakeCollector>,
}

pub fn harness(strategy: Strategy, collector: FakeCollector, overall_timeout: Duration) -> Harness {
    let (events, events_rx) = mpsc::channel(64);
    let process = FakeProcess::new();
    let fs = MockFileSystem::new();

    let core = SessionCore::new(strategy, OutputClassifier::default(), overall_timeout);
    let supervisor = Supervisor::new(core, events_rx, process.clone(), collector.clone())
        .with_transcript(Arc::new(fs.clone()), LOG_FILE);

    Harness {
        events,
        process,
        collector,
        fs,
        supervisor,
    }
}

pub fn stdout(line: &str) -> SessionEvent {
    SessionEvent::Line {
        stream: Stream::Stdout,
        line: line.to_string(),
    }
}

pub fn stderr(line: &str) -> SessionEvent {
    SessionEvent::Line {
        stream: Stream::Stderr,
        line: line.to_string(),
    }
}
