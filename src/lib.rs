//! Shared-cab ride matcher.
//!
//! Riders open a WebSocket session, a pool of workers matches queued ride
//! requests to nearby cabs with spare seats, and every seat reservation is
//! a single atomic step in the geo-index store.

pub mod config;
pub mod dispatch;
pub mod fare;
pub mod geo;
pub mod http;
pub mod lifecycle;
pub mod matching;
pub mod observability;
pub mod queue;
pub mod resilience;
pub mod rides;
pub mod session;
pub mod store;
pub mod trips;

pub use config::MatcherConfig;
pub use http::HttpServer;
pub use lifecycle::{Services, Shutdown};
