// prometheus exporter setup

use metrics_exporter_prometheus::{Matcher, PrometheusHandle};
use serve_metrics::metrics_builder;

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const SEGMENT_COUNTS: &[f64] = &[0.0, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0];

    metrics_builder()
        .set_buckets_for_metric(
            Matcher::Full("capture_export_segments".to_string()),
            SEGMENT_COUNTS,
        )
        .unwrap()
        .install_recorder()
        .unwrap()
}
