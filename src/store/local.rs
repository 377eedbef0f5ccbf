//! Archives kept in a local directory
//!
//! Every archive whose name carries a version is an artifact; everything else,
//! checksums and notes included, is ignored. Useful for serving builds without a bucket.

use std::path::PathBuf;

use futures::TryStreamExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::manifest::Manifest;
use crate::store::{ArchiveStream, ArtifactStore, StoreError};
use crate::version::{Series, Version, is_archive_name, parse};

pub struct DirectoryArtifactStore {
    root: PathBuf,
}

impl DirectoryArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Catalog of the archive files currently in the directory
    async fn catalog(&self) -> Result<Manifest, StoreError> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if !is_archive_name(&entry.file_name().to_string_lossy()) {
                debug!("Ignoring {:?}: not an archive", entry.path());
                continue;
            }
            paths.push(entry.path());
        }
        paths.sort();

        let mut catalog = Manifest::default();
        for path in paths {
            let identifier = path.to_string_lossy();
            match parse(&identifier) {
                Ok(version) => catalog.versions.push(version),
                Err(e) => debug!("Ignoring {:?}: {}", path, e),
            }
        }

        Ok(catalog)
    }
}

#[async_trait::async_trait]
impl ArtifactStore for DirectoryArtifactStore {
    async fn download(&self, version: &Version) -> Result<ArchiveStream, StoreError> {
        let catalog = self.catalog().await?;
        let entry = catalog
            .find(version)
            .ok_or_else(|| StoreError::NotFound(version.canonical()))?;

        debug!("Reading {} from {}", version, entry.source());
        let file = tokio::fs::File::open(entry.source()).await?;

        Ok(Box::pin(ReaderStream::new(file).map_err(StoreError::from)))
    }

    async fn latest(&self, series: Option<Series>) -> Result<Version, StoreError> {
        let catalog = self.catalog().await?;

        catalog
            .latest_in(series)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("no archives in {:?}", self.root)))
    }
}
