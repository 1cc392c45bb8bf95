//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field
//! requirements. Every problem is reported, not just the first.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{BackendKind, MatcherConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &MatcherConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.store.backend == BackendKind::Redis && config.store.redis_url.is_empty() {
        errors.push(ValidationError::new("store.redis_url", "required for the redis backend"));
    }
    if config.queue.backend == BackendKind::Redis && config.queue.redis_url.is_empty() {
        errors.push(ValidationError::new("queue.redis_url", "required for the redis backend"));
    }
    if config.queue.match_queue.is_empty() {
        errors.push(ValidationError::new("queue.match_queue", "must not be empty"));
    }
    if config.queue.notify_queue.is_empty() {
        errors.push(ValidationError::new("queue.notify_queue", "must not be empty"));
    }
    if config.queue.match_queue == config.queue.notify_queue {
        errors.push(ValidationError::new(
            "queue.notify_queue",
            "must differ from queue.match_queue",
        ));
    }
    if config.queue.poll_timeout_ms == 0 {
        errors.push(ValidationError::new("queue.poll_timeout_ms", "must be > 0"));
    }
    if config.queue.memory_max_depth == 0 {
        errors.push(ValidationError::new("queue.memory_max_depth", "must be > 0"));
    }

    if config.workers.count == 0 {
        errors.push(ValidationError::new("workers.count", "must be > 0"));
    }

    let m = &config.matching;
    if !(1..=12).contains(&m.geohash_precision) {
        errors.push(ValidationError::new(
            "matching.geohash_precision",
            format!("{} is outside 1..=12", m.geohash_precision),
        ));
    }
    if m.cab_capacity < 1 {
        errors.push(ValidationError::new("matching.cab_capacity", "must be >= 1"));
    }
    if m.stale_after_secs <= 0 {
        errors.push(ValidationError::new("matching.stale_after_secs", "must be > 0"));
    }
    if !m.reference_point().is_valid() {
        errors.push(ValidationError::new(
            "matching.reference_lat",
            "reference point is not a valid coordinate",
        ));
    }

    if config.session.poll_interval_ms == 0 {
        errors.push(ValidationError::new("session.poll_interval_ms", "must be > 0"));
    }
    if config.session.outbound_buffer == 0 {
        errors.push(ValidationError::new("session.outbound_buffer", "must be > 0"));
    }

    let f = &config.fare;
    if f.per_km < 0.0 || f.min_fare < 0.0 || f.demand_step < 0.0 {
        errors.push(ValidationError::new("fare", "rates must not be negative"));
    }
    if f.max_multiplier < 1.0 {
        errors.push(ValidationError::new("fare.max_multiplier", "must be >= 1.0"));
    }

    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
