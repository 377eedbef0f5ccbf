//! HTTP surface of the gateway
//!
//! - `GET /` serves the latest version's root document
//! - `GET /version/{version}` serves that version's root document
//! - `GET /version/{version}/{*path}` serves any file beneath that version

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{LATEST, ServerConfig, StoreConfig};
use crate::gateway::{CacheGateway, GatewayError, ServedFile, extract};
use crate::store::{ArtifactStore, DirectoryArtifactStore, HttpArtifactStore};

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, body).into_response()
    }
}

pub fn router(gateway: Arc<CacheGateway>) -> Router {
    Router::new()
        .route("/", get(latest_root))
        .route("/version/{version}", get(version_root))
        .route("/version/{version}/{*path}", get(version_file))
        .layer(TraceLayer::new_for_http())
        .with_state(gateway)
}

async fn latest_root(State(gateway): State<Arc<CacheGateway>>) -> Result<Response, GatewayError> {
    serve_version(&gateway, LATEST, "").await
}

async fn version_root(
    State(gateway): State<Arc<CacheGateway>>,
    Path(version): Path<String>,
) -> Result<Response, GatewayError> {
    serve_version(&gateway, &version, "").await
}

async fn version_file(
    State(gateway): State<Arc<CacheGateway>>,
    Path((version, path)): Path<(String, String)>,
) -> Result<Response, GatewayError> {
    serve_version(&gateway, &version, &path).await
}

async fn serve_version(
    gateway: &CacheGateway,
    requested: &str,
    relative: &str,
) -> Result<Response, GatewayError> {
    let version = gateway.resolve(requested).await?;
    let handle = gateway.ensure_cached(&version).await?;
    let served = gateway.serve(&handle, relative).await?;

    Ok(file_response(served))
}

fn file_response(served: ServedFile) -> Response {
    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static(served.content_type()),
        ),
        (header::CONTENT_LENGTH, HeaderValue::from(served.len)),
    ];

    (headers, Body::from_stream(ReaderStream::new(served.file))).into_response()
}

pub fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn ArtifactStore>> {
    let store: Arc<dyn ArtifactStore> = match config {
        StoreConfig::Http { base_url } => Arc::new(
            HttpArtifactStore::new(base_url)
                .with_context(|| format!("Failed to create HTTP store for {}", base_url))?,
        ),
        StoreConfig::Directory { path } => Arc::new(DirectoryArtifactStore::new(path.clone())),
    };
    Ok(store)
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let store = build_store(&config.store)?;
    let series = config.series().context("Invalid series in configuration")?;
    let cache_root = config.cache_root();

    tokio::fs::create_dir_all(&cache_root)
        .await
        .with_context(|| format!("Failed to create cache directory {:?}", cache_root))?;
    let swept = extract::remove_stale_staging(&cache_root)
        .with_context(|| format!("Failed to clean cache directory {:?}", cache_root))?;
    if swept > 0 {
        info!("Removed {} interrupted fills from {:?}", swept, cache_root);
    }

    let gateway = CacheGateway::new(store, cache_root)
        .with_series(series)
        .with_fetch_timeout(Duration::from_millis(config.fetch_timeout_ms));

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!(
        "Serving {:?} on http://{}",
        gateway.cache_root(),
        listener.local_addr()?
    );

    axum::serve(listener, router(Arc::new(gateway)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
