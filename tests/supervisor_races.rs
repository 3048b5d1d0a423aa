// tests/supervisor_races.rs
//
// Readiness and errors race towards the same settle guard. Whichever
// reaches it first decides the outcome.

mod common;
use crate::common::fakes::FakeCollector;
use crate::common::{harness, init_tracing, stderr, Harness, TestResult, LOG_FILE};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use cordova_harvest::classify::OutputClassifier;
use cordova_harvest::engine::{
    SessionCore, SessionEvent, Supervisor, SupervisorOptions, DEFAULT_OVERALL_TIMEOUT,
};
use cordova_harvest::fs::mock::MockFileSystem;
use cordova_harvest::paths::AppPaths;
use cordova_harvest::readiness::ReadinessPoller;
use cordova_harvest::types::{OutcomeReason, Strategy};

use harvest_test_utils::fakes::FakeProcess;

#[tokio::test(start_paused = true)]
async fn error_first_wins_and_nothing_is_copied() -> TestResult {
    init_tracing();
    let Harness {
        events,
        collector,
        fs,
        supervisor,
        ..
    } = harness(
        Strategy::FromArtifactDirectory,
        FakeCollector::succeeding(Duration::from_millis(100)),
        DEFAULT_OVERALL_TIMEOUT,
    );

    let session = tokio::spawn(supervisor.run());
    events.send(stderr("Error: build exploded")).await?;
    events.send(SessionEvent::ArtifactsReady).await?;

    assert_eq!(session.await??, OutcomeReason::ErrorOutput);
    assert_eq!(collector.started(), 0);
    assert!(fs.contents(LOG_FILE).is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn readiness_first_completes_the_copy_and_wins() -> TestResult {
    init_tracing();
    let Harness {
        events,
        process,
        collector,
        fs,
        supervisor,
    } = harness(
        Strategy::FromArtifactDirectory,
        FakeCollector::succeeding(Duration::from_millis(100)),
        DEFAULT_OVERALL_TIMEOUT,
    );

    let session = tokio::spawn(supervisor.run());
    let start = Instant::now();
    events.send(SessionEvent::ArtifactsReady).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    // arrives while copying; its timer would fire at 1050ms
    events.send(stderr("Error: late complaint")).await?;

    let outcome = session.await??;

    assert_eq!(outcome, OutcomeReason::Success);
    // copy done at 100ms, plus the 500ms kill grace
    assert_eq!(start.elapsed(), Duration::from_millis(600));
    assert_eq!(collector.started(), 1);
    assert_eq!(process.terminations(), 1);
    assert!(fs.written_paths().is_empty(), "no transcript on success");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_copy_loses_to_a_pending_error() -> TestResult {
    init_tracing();
    let Harness {
        events,
        collector,
        supervisor,
        ..
    } = harness(
        Strategy::FromArtifactDirectory,
        FakeCollector::succeeding(Duration::from_secs(5)),
        DEFAULT_OVERALL_TIMEOUT,
    );

    let session = tokio::spawn(supervisor.run());
    let start = Instant::now();
    events.send(SessionEvent::ArtifactsReady).await?;
    events.send(stderr("Error: during copy")).await?;

    assert_eq!(session.await??, OutcomeReason::ErrorOutput);
    assert_eq!(start.elapsed(), Duration::from_secs(1));
    assert_eq!(collector.started(), 1);

    // the copy was stopped before the session returned, not left running
    assert_eq!(collector.cancelled(), 1);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(collector.completed(), 0, "copy finished after settling");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_copy_is_a_copy_failure() -> TestResult {
    init_tracing();
    let Harness {
        events,
        process,
        fs,
        supervisor,
        ..
    } = harness(
        Strategy::FromArtifactDirectory,
        FakeCollector::failing(Duration::from_millis(10), "no isCordova assignment"),
        DEFAULT_OVERALL_TIMEOUT,
    );

    let session = tokio::spawn(supervisor.run());
    events.send(SessionEvent::ArtifactsReady).await?;

    assert_eq!(session.await??, OutcomeReason::CopyFailure);
    assert_eq!(process.terminations(), 1);
    assert!(fs.contents(LOG_FILE).is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn server_marker_starts_the_copy() -> TestResult {
    init_tracing();
    let Harness {
        events,
        collector,
        supervisor,
        ..
    } = harness(
        Strategy::FromRunningServer,
        FakeCollector::succeeding(Duration::from_millis(200)),
        DEFAULT_OVERALL_TIMEOUT,
    );

    let session = tokio::spawn(supervisor.run());
    let start = Instant::now();
    events
        .send(common::stdout("=> App running at: http://localhost:3080/"))
        .await?;

    assert_eq!(session.await??, OutcomeReason::Success);
    assert_eq!(start.elapsed(), Duration::from_millis(700));
    assert_eq!(collector.started(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn poller_ignores_stale_build_until_manifest_changes() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let paths = AppPaths::new("/app", "/desktop/meteor", LOG_FILE);
    fs.add_file(paths.index(), "<html></html>");
    fs.add_file(paths.manifest(), r#"{"manifest":["previous run"]}"#);

    let poller = ReadinessPoller::new(Arc::new(fs.clone()), paths.clone());
    let stale = poller.capture_existing();
    assert!(stale.is_some());

    let (events, events_rx) = mpsc::channel(16);
    let collector = FakeCollector::succeeding(Duration::ZERO);
    let core = SessionCore::new(
        Strategy::FromArtifactDirectory,
        OutputClassifier::default(),
        DEFAULT_OVERALL_TIMEOUT,
    );
    let supervisor = Supervisor::new(core, events_rx, FakeProcess::new(), collector.clone())
        .with_options(SupervisorOptions {
            poll_interval: Duration::from_secs(1),
        })
        .with_readiness(poller, stale);

    let session = tokio::spawn(supervisor.run());
    let start = Instant::now();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(collector.started(), 0, "stale manifest must not count as ready");
    fs.add_file(paths.manifest(), r#"{"manifest":["this run"]}"#);

    let outcome = session.await??;
    drop(events);

    assert_eq!(outcome, OutcomeReason::Success);
    assert_eq!(collector.started(), 1);
    // picked up by the 3s poll, then the kill grace
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert!(start.elapsed() < Duration::from_secs(4));
    Ok(())
}
