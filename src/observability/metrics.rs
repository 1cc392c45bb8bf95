//! Metrics collection and exposition.
//!
//! # Metrics
//! - `matcher_jobs_total` (counter): processed jobs by `outcome`
//! - `matcher_new_cabs_total` (counter): cabs opened by the fallback
//! - `matcher_race_lost_total` (counter): assignments that lost a race
//! - `session_rollbacks_total` (counter): rollbacks run by sessions
//! - `fare_quotes_total` (counter): fare quotes by `cache` hit / miss

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_job(outcome: &'static str) {
    counter!("matcher_jobs_total", "outcome" => outcome).increment(1);
}

pub fn record_new_cab() {
    counter!("matcher_new_cabs_total").increment(1);
}

pub fn record_race_lost() {
    counter!("matcher_race_lost_total").increment(1);
}

pub fn record_rollback() {
    counter!("session_rollbacks_total").increment(1);
}

pub fn record_fare_quote(cache_hit: bool) {
    let cache = if cache_hit { "hit" } else { "miss" };
    counter!("fare_quotes_total", "cache" => cache).increment(1);
}
