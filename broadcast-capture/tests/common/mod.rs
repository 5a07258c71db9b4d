#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::Once;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use broadcast_capture::auth::{ApiKeys, API_KEY_HEADER};
use broadcast_capture::config::Config;
use broadcast_capture::index::queue::IndexQueue;
use broadcast_capture::server::build_app;
use health::HealthRegistry;

pub const ADMIN_KEY: &str = "admin-key";
pub const INGEST_KEY: &str = "ingest-key";

static TRACING_INIT: Once = Once::new();
pub fn setup_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::TestWriter::new())
            .init()
    });
}

pub fn test_config(data_root: &Path) -> Config {
    Config {
        address: SocketAddr::from_str("127.0.0.1:0").unwrap(),
        data_root: data_root.to_path_buf(),
        schema_dir: data_root.join("schemas"),
        api_keys: ApiKeys::from_str(&format!("admin:{ADMIN_KEY},ingest:{INGEST_KEY}")).unwrap(),
        max_body_bytes: 1024,
        index_queue_capacity: 64,
        index_concurrency: 2,
        export_prometheus: false,
        otel_url: None,
        otel_sampling_rate: 0.0,
        otel_service_name: "broadcast-capture-testing".to_string(),
        log_level: tracing::Level::INFO,
    }
}

pub struct TestApp {
    pub router: Router,
    pub queue: IndexQueue,
    pub data: tempfile::TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        setup_tracing();
        let data = tempfile::tempdir().expect("failed to create data dir");
        let (router, queue) = build_app(&test_config(data.path()), HealthRegistry::new("test"))
            .await
            .expect("failed to build app");
        Self {
            router,
            queue,
            data,
        }
    }

    pub fn root(&self) -> &Path {
        self.data.path()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        key: Option<&str>,
        body: impl Into<Body>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body.into()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        key: Option<&str>,
        body: impl Into<Body>,
    ) -> (StatusCode, Value) {
        let (status, body) = self.request(method, uri, key, body).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }
}
