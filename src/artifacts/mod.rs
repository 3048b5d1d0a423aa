// src/artifacts/mod.rs

//! Copying a finished `web.cordova` build into the desktop app.
//!
//! The collector runs once per session, after the supervisor decided the
//! build is ready:
//!
//! 1. clear the destination directory
//! 2. for [`Strategy::FromRunningServer`], fetch `index.html` and
//!    `program.json` from the debug server into the build directory
//! 3. verify the build directory, index and manifest exist
//! 4. copy the tree and normalise permissions
//! 5. switch the bundle from `isCordova` to `isDesktop`
//! 6. point the embedded runtime config at the desktop base URL
//!
//! Any failure ends the session with `CopyFailure`. Once the session has
//! settled the supervisor cancels the copy and waits for it to stop; every
//! step checks the token before it writes.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::CollectError;
use crate::paths::AppPaths;
use crate::types::Strategy;

pub mod copy;
pub mod fetch;
pub mod rewrite;

pub use fetch::DebugEndpoint;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// The seam through which the supervisor starts the artifact hand-off.
///
/// The returned future is spawned as its own task, so it must own
/// everything it needs. After `cancel` fires it must stop writing and
/// resolve promptly.
pub trait CollectorBackend: Send {
    fn collect(
        &self,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), CollectError>> + Send + 'static>>;
}

#[derive(Debug, Clone)]
pub struct ArtifactCollector {
    strategy: Strategy,
    paths: AppPaths,
    base_url: String,
    endpoint: DebugEndpoint,
    client: reqwest::Client,
}

impl ArtifactCollector {
    pub fn new(
        strategy: Strategy,
        paths: AppPaths,
        base_url: impl Into<String>,
        endpoint: DebugEndpoint,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("building HTTP client for the debug server")?;

        Ok(Self {
            strategy,
            paths,
            base_url: base_url.into(),
            endpoint,
            client,
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Run the whole hand-off to completion.
    pub async fn run(&self) -> Result<(), CollectError> {
        self.run_until_cancelled(CancellationToken::new()).await
    }

    /// Run the hand-off, stopping with [`CollectError::Cancelled`] once
    /// `cancel` fires.
    pub async fn run_until_cancelled(&self, cancel: CancellationToken) -> Result<(), CollectError> {
        info!(
            strategy = %self.strategy,
            from = %self.paths.build_dir.display(),
            to = %self.paths.output_dir.display(),
            "collecting web.cordova build"
        );

        let output_dir = self.paths.output_dir.clone();
        let token = cancel.clone();
        blocking(move || {
            copy::ensure_live(&token)?;
            copy::clear_dir(&output_dir)
        })
        .await?;

        if self.strategy == Strategy::FromRunningServer {
            let docs = tokio::select! {
                docs = fetch::fetch_documents(&self.client, &self.endpoint) => docs?,
                _ = cancel.cancelled() => return Err(CollectError::Cancelled),
            };
            copy::ensure_live(&cancel)?;
            docs.store(&self.paths).await?;
        }

        let paths = self.paths.clone();
        let base_url = self.base_url.clone();
        blocking(move || {
            copy::verify_sources(&paths)?;
            let copied = copy::copy_tree(&paths.build_dir, &paths.output_dir, &cancel)?;
            debug!(files = copied, "copied build tree");
            copy::normalize_permissions(&paths.output_dir, &cancel)?;

            let report =
                rewrite::inject_is_desktop_tree(&paths.output_dir, &paths.output_manifest(), &cancel)?;
            debug!(
                assignments = report.assignments,
                startup_calls = report.startup_calls,
                "bundle switched to isDesktop"
            );

            copy::ensure_live(&cancel)?;
            rewrite::rewrite_index_config(&paths.output_index(), &base_url)
        })
        .await?;

        info!(to = %self.paths.output_dir.display(), "web.cordova build collected");
        Ok(())
    }
}

impl CollectorBackend for ArtifactCollector {
    fn collect(
        &self,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), CollectError>> + Send + 'static>> {
        let this = self.clone();
        Box::pin(async move { this.run_until_cancelled(cancel).await })
    }
}

/// Run filesystem work off the async runtime.
async fn blocking<F>(work: F) -> Result<(), CollectError>
where
    F: FnOnce() -> Result<(), CollectError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CollectError::Io(anyhow!("copy task failed: {e}")))?
}
