//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, path, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): traffic guard rejections by path
//! - `gateway_panics_total` (counter): recovered handler panics by path
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests and
//!   metrics-disabled deployments pay nothing
//! - The Prometheus exporter serves its own scrape endpoint

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "gateway_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "gateway_request_duration_seconds";
pub const RATE_LIMITED_TOTAL: &str = "gateway_rate_limited_total";
pub const PANICS_TOTAL: &str = "gateway_panics_total";

/// Install the global Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

/// Record a finished request.
pub fn record_request(method: &str, status: u16, path: &str, start: Instant) {
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(path: &str) {
    metrics::counter!(RATE_LIMITED_TOTAL, "path" => path.to_string()).increment(1);
}

pub fn record_panic(path: &str) {
    metrics::counter!(PANICS_TOTAL, "path" => path.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_request("GET", 200, "/api/echo", Instant::now());
        record_rate_limited("/api/echo");
        record_panic("/api/echo");
    }

    #[test]
    fn test_rendered_output_names_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || record_rate_limited("/api/echo"));

        let output = handle.render();
        assert!(output.contains(RATE_LIMITED_TOTAL));
        assert!(output.contains("/api/echo"));
    }
}
