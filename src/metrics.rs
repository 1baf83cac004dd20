use std::net::SocketAddr;
use tracing::{info, warn};

pub const CANDIDATES_TOTAL: &str = "ingest_candidates_total";
pub const REJECTED_TOTAL: &str = "ingest_rejected_total";
pub const UNRESOLVED_VENUES_TOTAL: &str = "ingest_unresolved_venues_total";
pub const UNDATED_TOTAL: &str = "ingest_undated_events_total";
pub const DEDUPED_TOTAL: &str = "ingest_deduped_total";
pub const IMPORTED_TOTAL: &str = "ingest_imported_total";
pub const ADAPTER_FAILURES_TOTAL: &str = "ingest_adapter_failures_total";
pub const ADAPTER_ALERTS_TOTAL: &str = "ingest_adapter_alerts_total";
pub const COMMIT_FAILURES_TOTAL: &str = "ingest_commit_failures_total";
pub const ADAPTER_DURATION_SECONDS: &str = "ingest_adapter_duration_seconds";
pub const IMPORT_DURATION_SECONDS: &str = "ingest_import_duration_seconds";

/// Installs the Prometheus exporter when `INGEST_METRICS_PORT` is set.
/// Without an exporter the `metrics` macros are no-ops.
pub fn init_metrics() {
    let port: u16 = match std::env::var("INGEST_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        Some(port) => port,
        None => return,
    };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed (possibly already installed): {}", e),
    }
}
