//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the matcher.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::geo::Position;

/// Root configuration for the ride matcher.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MatcherConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Geo-index store backend.
    pub store: StoreConfig,

    /// Request queue backend and queue names.
    pub queue: QueueConfig,

    /// Worker pool sizing.
    pub workers: WorkerConfig,

    /// Matching policy constants.
    pub matching: MatchingConfig,

    /// Rider session timings.
    pub session: SessionConfig,

    /// Fare calculation.
    pub fare: FareConfig,

    /// Requeue backoff.
    pub retries: RetryConfig,

    /// HTTP timeouts.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8081").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8081".to_string(),
        }
    }
}

/// Which implementation backs a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Redis,
    Memory,
}

/// Geo-index store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,

    /// Redis connection URL, used by the redis backend.
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Request queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: BackendKind,

    /// Redis connection URL, used by the redis backend.
    pub redis_url: String,

    /// Work queue carrying ride-request jobs.
    pub match_queue: String,

    /// Queue carrying driver notifications (rider cancellations).
    pub notify_queue: String,

    /// Consumer name; scopes the in-flight list on the redis backend.
    pub consumer_name: String,

    /// How long the dispatcher blocks waiting for a delivery before
    /// re-checking for shutdown.
    pub poll_timeout_ms: u64,

    /// Most messages a memory-backend queue holds before publishes are
    /// refused. Nothing consumes the notify queue in-process, so this also
    /// caps its growth.
    pub memory_max_depth: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            match_queue: "ride-matching".to_string(),
            notify_queue: "driver-notifications".to_string(),
            consumer_name: "matcher-1".to_string(),
            poll_timeout_ms: 1000,
            memory_max_depth: 10_000,
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of matching workers.
    pub count: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { count: 4 }
    }
}

/// Matching policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Geohash length used for cells.
    pub geohash_precision: usize,

    /// Seats per cab; luggage occupies seats too.
    pub cab_capacity: u32,

    /// Cabs whose last heartbeat is older than this are ignored.
    pub stale_after_secs: i64,

    /// Fixed destination used to derive rider tolerance (airport).
    pub reference_lat: f64,
    pub reference_lng: f64,
}

impl MatchingConfig {
    pub fn reference_point(&self) -> Position {
        Position::new(self.reference_lat, self.reference_lng)
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            geohash_precision: 6,
            cab_capacity: 4,
            stale_after_secs: 30,
            reference_lat: 23.3179,
            reference_lng: 77.349225,
        }
    }
}

/// Rider session timings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Window between presence registration and job publication.
    pub grace_period_ms: u64,

    /// Status polling interval.
    pub poll_interval_ms: u64,

    /// Upper bound on how long a rider waits for a match (0 = unbounded).
    pub max_wait_secs: u64,

    /// Outbound message buffer per connection.
    pub outbound_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 5000,
            poll_interval_ms: 50,
            max_wait_secs: 300,
            outbound_buffer: 32,
        }
    }
}

/// Fare calculation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FareConfig {
    /// Linear rate per km.
    pub per_km: f64,

    /// Floor applied after the demand multiplier.
    pub min_fare: f64,

    /// Multiplier increment per waiting rider in the cell.
    pub demand_step: f64,

    /// Cap on the demand multiplier.
    pub max_multiplier: f64,

    /// Lifetime of a cached quote.
    pub cache_ttl_secs: u64,
}

impl Default for FareConfig {
    fn default() -> Self {
        Self {
            per_km: 12.0,
            min_fare: 50.0,
            demand_step: 0.05,
            max_multiplier: 2.0,
            cache_ttl_secs: 30,
        }
    }
}

/// Requeue backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Timeout configuration for HTTP requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout for plain HTTP routes in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 10 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
