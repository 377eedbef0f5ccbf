//! On-demand cache fill
//!
//! Maps a requested version onto a directory under the cache root, fetching
//! and unpacking the version's archive the first time it is asked for.
//!
//! Per version the lifecycle is: unresolved, fetching, extracted, serving.
//! A failed fill leaves no directory behind, so the next request retries from
//! scratch. Cached directories are never revalidated.
//!
//! # Modules
//!
//! - [`extract`]: compression detection and safe tar unpacking
//! - [`inflight`]: one fill per version no matter how many callers wait on it

pub mod extract;
pub mod inflight;

use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures::{StreamExt, TryStreamExt};
use thiserror::Error;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{FETCH_TIMEOUT_MS, LATEST, ROOT_DOCUMENT};
use crate::store::{ArtifactStore, StoreError};
use crate::version::{ParseError, Series, Version, parse};

use extract::ExtractError;
use inflight::{InFlight, Slot};

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Path escapes the version root: {0}")]
    PathTraversal(String),

    #[error("Fetching archive failed: {0}")]
    Fetch(Arc<StoreError>),

    #[error("Unpacking archive failed: {0}")]
    Extract(Arc<ExtractError>),

    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("Fill abandoned before completing")]
    Aborted,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Parse(_) | GatewayError::PathTraversal(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Fetch(_)
            | GatewayError::Extract(_)
            | GatewayError::Io(_)
            | GatewayError::Aborted => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => GatewayError::NotFound(what),
            other => GatewayError::Fetch(Arc::new(other)),
        }
    }
}

impl From<ExtractError> for GatewayError {
    fn from(e: ExtractError) -> Self {
        match e {
            // download failures surface through the read side of the bridge
            ExtractError::Io(io) => match io.downcast::<StoreError>() {
                Ok(store) => GatewayError::Fetch(Arc::new(store)),
                Err(io) => GatewayError::Extract(Arc::new(ExtractError::Io(io))),
            },
            other => GatewayError::Extract(Arc::new(other)),
        }
    }
}

impl From<io::Error> for GatewayError {
    fn from(e: io::Error) -> Self {
        GatewayError::Io(Arc::new(e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Absent,
    Fetching,
    Cached,
}

/// A version whose files are on disk
#[derive(Debug, Clone)]
pub struct CacheHandle {
    pub version: Version,
    pub root: PathBuf,
}

impl CacheHandle {
    /// Map a request path onto a path beneath the version root
    ///
    /// Only plain names are accepted; `..`, absolute paths and drive prefixes
    /// are refused. An empty path names the root document.
    pub fn locate(&self, relative: &str) -> Result<PathBuf, GatewayError> {
        let mut path = self.root.clone();
        let mut depth = 0;

        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(GatewayError::PathTraversal(relative.to_string()));
                }
            }
        }

        if depth == 0 {
            path.push(ROOT_DOCUMENT);
        }
        Ok(path)
    }
}

/// An open file ready to be streamed to a client
#[derive(Debug)]
pub struct ServedFile {
    pub path: PathBuf,
    pub file: tokio::fs::File,
    pub len: u64,
}

impl ServedFile {
    pub fn content_type(&self) -> &'static str {
        content_type_for(&self.path)
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("json") | Some("map") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

pub struct CacheGateway {
    store: Arc<dyn ArtifactStore>,
    cache_root: PathBuf,
    series: Option<Series>,
    fetch_timeout: Duration,
    in_flight: InFlight,
}

impl CacheGateway {
    pub fn new(store: Arc<dyn ArtifactStore>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            cache_root: cache_root.into(),
            series: None,
            fetch_timeout: Duration::from_millis(FETCH_TIMEOUT_MS),
            in_flight: InFlight::new(),
        }
    }

    /// Restrict `latest` to one release series
    pub fn with_series(mut self, series: Option<Series>) -> Self {
        self.series = series;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn version_dir(&self, version: &Version) -> PathBuf {
        self.cache_root.join(version.canonical())
    }

    /// Turn a request's version segment into a concrete version
    ///
    /// `latest` asks the store; anything else must parse.
    pub async fn resolve(&self, requested: &str) -> Result<Version, GatewayError> {
        if requested != LATEST {
            return Ok(parse(requested)?);
        }

        let version = self.store.latest(self.series).await?;
        debug!("Resolved {} to {}", LATEST, version);
        Ok(version)
    }

    pub fn state(&self, version: &Version) -> CacheState {
        let key = version.canonical();
        if self.in_flight.contains(&key) {
            CacheState::Fetching
        } else if self.cache_root.join(&key).is_dir() {
            CacheState::Cached
        } else {
            CacheState::Absent
        }
    }

    /// Make sure the version's files are on disk, fetching them if needed
    pub async fn ensure_cached(&self, version: &Version) -> Result<CacheHandle, GatewayError> {
        let key = version.canonical();
        let dir = self.cache_root.join(&key);
        let handle = |root: PathBuf| CacheHandle {
            version: version.clone(),
            root,
        };

        if is_dir(&dir).await {
            debug!("Cache hit for {}", key);
            return Ok(handle(dir));
        }

        match self.in_flight.join(&key) {
            Slot::Follower(follower) => {
                debug!("Waiting on in-flight fill of {}", key);
                follower.wait().await.map(handle)
            }
            Slot::Leader(guard) => {
                // a fill may have finished between the miss and the join
                if is_dir(&dir).await {
                    guard.complete(Ok(dir.clone()));
                    return Ok(handle(dir));
                }

                info!("Cache miss for {}, fetching", key);
                let outcome = self.fill(version, &dir, guard.cancellation()).await;
                if let Err(e) = &outcome {
                    error!("Failed to cache {}: {}", key, e);
                }

                guard.complete(outcome.clone());
                outcome.map(handle)
            }
        }
    }

    async fn fill(
        &self,
        version: &Version,
        dir: &Path,
        cancel: CancellationToken,
    ) -> Result<PathBuf, GatewayError> {
        let stream = tokio::time::timeout(self.fetch_timeout, self.store.download(version))
            .await
            .map_err(|_| {
                warn!("Download of {} did not start within {:?}", version, self.fetch_timeout);
                StoreError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no response within {:?}", self.fetch_timeout),
                ))
            })??;

        // stop pulling the body as soon as the leader goes away
        let stream = Box::pin(
            stream
                .map_err(io::Error::other)
                .take_until(cancel.clone().cancelled_owned()),
        );
        let reader = CancellableReader {
            inner: SyncIoBridge::new(StreamReader::new(stream)),
            cancel,
        };
        let cache_root = self.cache_root.clone();
        let target = dir.to_path_buf();

        let stats = tokio::task::spawn_blocking(move || extract::install(reader, &cache_root, &target))
            .await
            .unwrap_or_else(|e| Err(ExtractError::from(e)))?;

        info!(
            "Cached {} ({} files) at {:?}",
            version, stats.files, dir
        );
        Ok(dir.to_path_buf())
    }

    /// Open a file beneath a cached version
    ///
    /// Directories resolve to their root document.
    pub async fn serve(&self, handle: &CacheHandle, relative: &str) -> Result<ServedFile, GatewayError> {
        let mut path = handle.locate(relative)?;
        if is_dir(&path).await {
            path.push(ROOT_DOCUMENT);
        }

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(GatewayError::NotFound(format!(
                    "{}/{}",
                    handle.version, relative
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(GatewayError::NotFound(format!("{}/{}", handle.version, relative)));
        }

        debug!("Serving {:?} ({} bytes)", path, metadata.len());
        Ok(ServedFile {
            path,
            file,
            len: metadata.len(),
        })
    }
}

/// Blocking reader that fails once its fill is cancelled
///
/// A cancelled body ends early, which must not pass for a short archive.
struct CancellableReader<R> {
    inner: R,
    cancel: CancellationToken,
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        if self.cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "fill cancelled"));
        }
        Ok(read)
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
