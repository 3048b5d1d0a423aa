//! Shared helpers for the `cordova-harvest` integration tests.

pub mod builders;
pub mod fakes;
pub mod fixtures;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test-captured subscriber once per test binary.
///
/// Output only appears for failing tests (or with `--nocapture`). The
/// filter comes from `HARVEST_LOG`, like the binary, defaulting to the
/// supervisor's own decisions at `debug`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_env("HARVEST_LOG")
            .unwrap_or_else(|_| EnvFilter::new("warn,cordova_harvest::engine=debug"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Bound a real-clock test. Do not use under a paused clock; the timeout
/// would advance with everything else.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .expect("test did not finish within 10 seconds")
}
