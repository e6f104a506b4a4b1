//! Prometheus exposition of client metrics.
//!
//! Node operations are instrumented with `autometrics` against the crate API
//! objective; this module only renders what has been collected.

use autometrics::prometheus_exporter;

/// Export metrics for Prometheus to scrape
pub fn encode_metrics() -> String {
    let autometrics_response = prometheus_exporter::encode_http_response();
    autometrics_response.into_body()
}
