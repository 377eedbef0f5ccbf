//! Remote artifact stores
//!
//! An artifact store holds one compressed archive per version. The gateway
//! only needs two things from it: the archive bytes for a version, and the
//! newest version it knows about.
//!
//! # Modules
//!
//! - [`http`]: bucket served over HTTP next to a published `manifest.json`
//! - [`local`]: directory of archive files on the local filesystem

pub mod http;
pub mod local;

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::version::{Series, Version};

pub use http::HttpArtifactStore;
pub use local::DirectoryArtifactStore;

/// Compressed archive contents, as they arrive
pub type ArchiveStream = Pin<Box<dyn Stream<Item = Result<Bytes, StoreError>> + Send>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found upstream: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Whether asking again later might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Network(_) | StoreError::Io(_))
    }
}

/// Source of release archives
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Start downloading the archive for `version`
    ///
    /// # Returns
    /// * `Ok(ArchiveStream)` - archive bytes, still compressed
    /// * `Err(StoreError::NotFound)` - the store has no such version
    async fn download(&self, version: &Version) -> Result<ArchiveStream, StoreError>;

    /// Newest version available, optionally restricted to a series
    async fn latest(&self, series: Option<Series>) -> Result<Version, StoreError>;
}
