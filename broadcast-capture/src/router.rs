use std::future::ready;
use std::path::Path;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use health::HealthRegistry;
use serve_metrics::track_metrics;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::{require_admin, require_ingest, ApiKeys};
use crate::capture;
use crate::export::TimeWindowExporter;
use crate::index::EventIndex;
use crate::pipeline::IngestionPipeline;
use crate::prometheus::setup_metrics_recorder;

#[derive(Clone)]
pub struct State {
    pub pipeline: IngestionPipeline,
    pub index: Arc<dyn EventIndex + Send + Sync>,
    pub exporter: TimeWindowExporter,
    pub api_keys: ApiKeys,
}

async fn index() -> &'static str {
    "broadcast-capture"
}

pub fn router(
    state: State,
    liveness: HealthRegistry,
    data_root: &Path,
    max_body_bytes: usize,
    metrics: bool,
) -> Router {
    let ingest_router = Router::new()
        .route("/ingest/:category", post(capture::ingest))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_ingest));

    let admin_router = Router::new()
        .route("/search/events", get(capture::search))
        .route("/export/hls", post(capture::export))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let status_router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())));

    let router = Router::new()
        .merge(ingest_router)
        .merge(admin_router)
        .merge(status_router)
        .nest_service("/hls", ServeDir::new(data_root.join("hls")))
        .nest_service("/exports", ServeDir::new(data_root.join("exports")))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when capture is used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();

        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
