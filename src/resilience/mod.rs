//! Retry pacing for transient failures.
//!
//! # Design Decisions
//! - Retries happen by requeueing the job; this module only decides how
//!   long a worker waits before handing the job back
//! - The delay is keyed on the delivery attempt carried by the queue, so
//!   it keeps growing across workers and restarts

pub mod backoff;

pub use backoff::{calculate_backoff, retry_delay};
