//! Metrics collection and exposition.
//!
//! # Metrics
//! - `kds_builds_total` (counter): bundle builds by outcome (`published`, `unchanged`, `failed`)
//! - `kds_publications_total` (counter): accepted snapshot updates by node
//! - `kds_snapshot_resources` (gauge): resources in the last published bundle by kind
//! - `kds_fetch_requests_total` (counter): discovery fetches by kind and outcome
//! - `kds_registry_version` (gauge): registry resource-version cursor

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resources::ResourceBundle;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_build(outcome: &'static str) {
    metrics::counter!("kds_builds_total", "outcome" => outcome).increment(1);
}

pub fn record_publication(node: &str, bundle: &ResourceBundle) {
    metrics::counter!("kds_publications_total", "node" => node.to_string()).increment(1);
    for (kind, count) in bundle.counts() {
        metrics::gauge!("kds_snapshot_resources", "kind" => kind.as_str()).set(count as f64);
    }
}

pub fn record_fetch(kind: &str, outcome: &'static str) {
    metrics::counter!("kds_fetch_requests_total", "kind" => kind.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_registry_version(version: u64) {
    metrics::gauge!("kds_registry_version").set(version as f64);
}
