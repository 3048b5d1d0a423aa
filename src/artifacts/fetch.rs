// src/artifacts/fetch.rs

//! Fetching the build documents from the toolchain's debug server.

use anyhow::Context;
use tracing::debug;

use crate::errors::CollectError;
use crate::paths::AppPaths;

pub const INDEX_PATH: &str = "/__cordova/index.html";
pub const MANIFEST_PATH: &str = "/__cordova/manifest.json?meteor_dont_serve_index=true";

/// Every real cordova index loads this script.
pub const INDEX_SANITY_MARKER: &str = r#"src="/cordova.js""#;

/// Where the debug server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEndpoint {
    base: String,
}

impl DebugEndpoint {
    /// The server on this machine, as started by the toolchain.
    pub fn local(port: u16) -> Self {
        Self::new(format!("http://127.0.0.1:{port}"))
    }

    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn index_url(&self) -> String {
        format!("{}{INDEX_PATH}", self.base)
    }

    pub fn manifest_url(&self) -> String {
        format!("{}{MANIFEST_PATH}", self.base)
    }
}

/// The two documents served by the debug server.
#[derive(Debug, Clone)]
pub struct FetchedDocuments {
    pub index: String,
    pub manifest: Vec<u8>,
}

impl FetchedDocuments {
    /// Store both documents in the build directory, where the copy step
    /// picks them up.
    pub async fn store(&self, paths: &AppPaths) -> Result<(), CollectError> {
        tokio::fs::create_dir_all(&paths.build_dir)
            .await
            .with_context(|| format!("creating {}", paths.build_dir.display()))?;
        tokio::fs::write(paths.index(), &self.index)
            .await
            .with_context(|| format!("writing {}", paths.index().display()))?;
        tokio::fs::write(paths.manifest(), &self.manifest)
            .await
            .with_context(|| format!("writing {}", paths.manifest().display()))?;
        Ok(())
    }
}

/// Fetch the index, then the manifest. Fails fast on the first fetch or
/// sanity check that fails.
pub async fn fetch_documents(
    client: &reqwest::Client,
    endpoint: &DebugEndpoint,
) -> Result<FetchedDocuments, CollectError> {
    let index_url = endpoint.index_url();
    let index = get(client, &index_url).await?.text().await.map_err(|source| CollectError::Fetch {
        url: index_url.clone(),
        source,
    })?;
    if !index.contains(INDEX_SANITY_MARKER) {
        return Err(CollectError::SanityCheck { what: "index.html" });
    }
    debug!(url = %index_url, bytes = index.len(), "fetched index");

    let manifest_url = endpoint.manifest_url();
    let manifest = get(client, &manifest_url)
        .await?
        .bytes()
        .await
        .map_err(|source| CollectError::Fetch {
            url: manifest_url.clone(),
            source,
        })?
        .to_vec();
    if !looks_like_manifest(&manifest) {
        return Err(CollectError::SanityCheck { what: "program.json" });
    }
    debug!(url = %manifest_url, bytes = manifest.len(), "fetched manifest");

    Ok(FetchedDocuments { index, manifest })
}

async fn get(client: &reqwest::Client, url: &str) -> Result<reqwest::Response, CollectError> {
    client
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|source| CollectError::Fetch {
            url: url.to_string(),
            source,
        })
}

fn looks_like_manifest(body: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|doc| doc.get("manifest").map(|m| m.is_array()))
        .unwrap_or(false)
}
