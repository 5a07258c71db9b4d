use std::time::Duration;

use axum::Router;
use config::Config;
use envconfig::Envconfig;
use eyre::Result;
use futures::future::{select, Either};
use health::{HealthHandle, HealthRegistry};

use cleanup::Cleaner;
use retention::RetentionSweeper;

mod cleanup;
mod config;
mod handlers;
mod retention;

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

async fn cleanup_loop(cleaner: Box<dyn Cleaner + Send + Sync>, interval_secs: u64, liveness: HealthHandle) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;
        cleaner.cleanup().await;
        liveness.report_healthy();
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let liveness = HealthRegistry::new("liveness");
    // Stalled after two missed sweeps.
    let sweeper_liveness = liveness.register(
        "retention_sweeper",
        Duration::from_secs(config.cleanup_interval_secs.saturating_mul(2).max(60)),
    );

    let cleaner = Box::new(RetentionSweeper::new(&config.data_root, config.retention_days));
    tracing::info!(
        retention_days = config.retention_days,
        "sweeping {} every {}s",
        config.data_root.display(),
        config.cleanup_interval_secs
    );
    let cleanup_loop = Box::pin(cleanup_loop(
        cleaner,
        config.cleanup_interval_secs,
        sweeper_liveness,
    ));

    let recorder_handle = config
        .export_prometheus
        .then(serve_metrics::setup_metrics_recorder);
    let app = handlers::app(liveness, recorder_handle);
    let http_server = Box::pin(listen(app, config.bind()));

    match select(http_server, cleanup_loop).await {
        Either::Left((listen_result, _)) => match listen_result {
            Ok(_) => {}
            Err(e) => tracing::error!("failed to start retention-janitor http server, {}", e),
        },
        Either::Right((_, _)) => {
            tracing::error!("retention-janitor cleanup task exited")
        }
    };
}
