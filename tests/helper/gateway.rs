//! Gateway and router fixtures

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use hermitcrab::gateway::CacheGateway;
use hermitcrab::server::router;
use hermitcrab::store::DirectoryArtifactStore;

/// A gateway over a directory of archives, both under one temp dir
pub struct TestGateway {
    pub dir: TempDir,
    pub gateway: Arc<CacheGateway>,
}

impl TestGateway {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("archives")).unwrap();

        let store = Arc::new(DirectoryArtifactStore::new(dir.path().join("archives")));
        let gateway = Arc::new(CacheGateway::new(store, dir.path().join("cache")));

        Self { dir, gateway }
    }

    pub fn archives(&self) -> std::path::PathBuf {
        self.dir.path().join("archives")
    }

    pub fn router(&self) -> Router {
        router(Arc::clone(&self.gateway))
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

/// Send a GET through the router in-process
pub async fn get(app: Router, uri: &str) -> TestResponse {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    TestResponse {
        status,
        content_type,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}
