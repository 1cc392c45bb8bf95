//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Workers, sessions, fare and HTTP handlers produce:
//!     → logging.rs (tracing events with rider_id / cab_id / worker_id fields)
//!     → metrics.rs (counters via the `metrics` facade)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Prometheus scrape endpoint, when enabled
//! ```
//!
//! # Design Decisions
//! - Counters go through the facade, so they are no-ops until an exporter
//!   is installed
//! - `RUST_LOG` overrides the configured level

pub mod logging;
pub mod metrics;
