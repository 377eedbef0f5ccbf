//! Artifact bucket served over HTTP
//!
//! The bucket publishes a manifest (see [`crate::manifest`]) at
//! `<base_url>/manifest.json`. Each entry's `filename` locates its archive:
//! absolute URLs are used as-is, anything else is resolved by its final path
//! segment against the base URL.

use futures::TryStreamExt;
use tracing::{debug, warn};

use crate::config::MANIFEST_FILE_NAME;
use crate::manifest::Manifest;
use crate::store::{ArchiveStream, ArtifactStore, StoreError};
use crate::version::{Series, Version};

pub struct HttpArtifactStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpArtifactStore {
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("hermitcrab/", env!("CARGO_PKG_VERSION")))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_manifest(&self) -> Result<Manifest, StoreError> {
        let url = format!("{}/{}", self.base_url, MANIFEST_FILE_NAME);
        let response = self.client.get(&url).send().await?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(url));
        }

        if !status.is_success() {
            warn!("Artifact bucket returned status {}: {}", status, url);
            return Err(StoreError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        response.json::<Manifest>().await.map_err(|e| {
            warn!("Failed to parse bucket manifest: {}", e);
            StoreError::InvalidResponse(e.to_string())
        })
    }

    fn archive_url(&self, entry: &Version) -> String {
        let source = entry.source();
        if source.starts_with("http://") || source.starts_with("https://") {
            return source.to_string();
        }

        let file_name = source.rsplit('/').next().unwrap_or(source);
        format!("{}/{}", self.base_url, file_name)
    }
}

#[async_trait::async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn download(&self, version: &Version) -> Result<ArchiveStream, StoreError> {
        let manifest = self.fetch_manifest().await?;
        let entry = manifest
            .find(version)
            .ok_or_else(|| StoreError::NotFound(version.canonical()))?;

        let url = self.archive_url(entry);
        debug!("Downloading {} from {}", version, url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(url));
        }

        if !status.is_success() {
            warn!("Artifact bucket returned status {}: {}", status, url);
            return Err(StoreError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        Ok(Box::pin(response.bytes_stream().map_err(StoreError::from)))
    }

    async fn latest(&self, series: Option<Series>) -> Result<Version, StoreError> {
        let manifest = self.fetch_manifest().await?;

        manifest.latest_in(series).cloned().ok_or_else(|| {
            StoreError::NotFound(match series {
                Some(series) => format!("no versions in series {}", series),
                None => "no versions published".to_string(),
            })
        })
    }
}
