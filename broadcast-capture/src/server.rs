use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use health::HealthRegistry;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::event_log::EventLog;
use crate::export::TimeWindowExporter;
use crate::index::queue::IndexQueue;
use crate::index::sqlite::SqliteIndex;
use crate::pipeline::IngestionPipeline;
use crate::router;
use crate::schema::SchemaRegistry;
use crate::time::SystemTime;

const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens the storage under `config.data_root` and builds the app. The index
/// queue is returned so callers can drain it.
pub async fn build_app(config: &Config, liveness: HealthRegistry) -> anyhow::Result<(Router, IndexQueue)> {
    let log = EventLog::new(&config.data_root);
    log.ensure_layout().await?;
    for dir in ["hls", "exports"] {
        tokio::fs::create_dir_all(config.data_root.join(dir)).await?;
    }

    let index = Arc::new(
        SqliteIndex::open(
            &config.data_root.join("db").join("events.sqlite"),
            config.index_concurrency as u32,
        )
        .await?,
    );
    let queue = IndexQueue::start(
        index.clone(),
        config.index_queue_capacity,
        config.index_concurrency,
        liveness.register("index_worker", Duration::from_secs(30)),
    );

    let pipeline = IngestionPipeline::new(
        Arc::new(SchemaRegistry::new(&config.schema_dir)),
        log,
        queue.clone(),
        Arc::new(SystemTime {}),
    );

    let state = router::State {
        pipeline,
        index,
        exporter: TimeWindowExporter::new(&config.data_root),
        api_keys: config.api_keys.clone(),
    };

    let app = router::router(
        state,
        liveness,
        &config.data_root,
        config.max_body_bytes,
        config.export_prometheus,
    );
    Ok((app, queue))
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let liveness = HealthRegistry::new("liveness");
    let (app, queue) = build_app(&config, liveness).await?;

    tracing::info!("listening on {:?}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, queue.wait_idle())
        .await
        .is_err()
    {
        tracing::warn!(
            pending = queue.pending(),
            "index queue not drained before shutdown"
        );
    }
    Ok(())
}
