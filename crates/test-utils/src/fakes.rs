use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cordova_harvest::artifacts::CollectorBackend;
use cordova_harvest::errors::CollectError;
use cordova_harvest::exec::SupervisedProcess;

/// A fake toolchain process that only records how often it was terminated.
#[derive(Debug, Clone, Default)]
pub struct FakeProcess {
    terminations: Arc<AtomicUsize>,
}

impl FakeProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter; keep a clone before handing the process to a
    /// supervisor.
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl SupervisedProcess for FakeProcess {
    fn terminate(&mut self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

/// A fake artifact collector:
/// - counts how often a copy was started, finished and cancelled
/// - takes `delay` (on the tokio clock) to finish
/// - fails with a rewrite error when built with [`FakeCollector::failing`]
/// - stops early with [`CollectError::Cancelled`] once its token fires.
#[derive(Debug, Clone)]
pub struct FakeCollector {
    delay: Duration,
    failure: Option<String>,
    started: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    cancelled: Arc<AtomicUsize>,
}

impl FakeCollector {
    pub fn succeeding(delay: Duration) -> Self {
        Self::with_outcome(delay, None)
    }

    pub fn failing(delay: Duration, message: &str) -> Self {
        Self::with_outcome(delay, Some(message.to_string()))
    }

    fn with_outcome(delay: Duration, failure: Option<String>) -> Self {
        Self {
            delay,
            failure,
            started: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Copies that ran all the way to the end and wrote their output.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl CollectorBackend for FakeCollector {
    fn collect(
        &self,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), CollectError>> + Send + 'static>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        let failure = self.failure.clone();
        let completed = Arc::clone(&self.completed);
        let cancelled = Arc::clone(&self.cancelled);

        Box::pin(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    cancelled.fetch_add(1, Ordering::SeqCst);
                    return Err(CollectError::Cancelled);
                }
            }
            match failure {
                Some(message) => Err(CollectError::Rewrite(message)),
                None => {
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        })
    }
}
