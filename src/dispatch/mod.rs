//! Dispatcher and worker pool.
//!
//! # Data Flow
//! ```text
//! Worker ──WorkerHandle (oneshot)──▶ idle registry (mpsc)
//!                                        │
//! JobQueue ──Delivery──▶ dispatcher ─────┴──▶ first idle worker
//!                                               │
//!            ack / nack(requeue) ◀──────────────┘ MatchEngine
//! ```
//!
//! # Design Decisions
//! - The dispatcher only pulls a delivery once a worker is idle, so no
//!   job waits in process memory while every worker is busy
//! - Shutdown stops pulling; jobs already handed out run to completion

pub mod pool;
pub mod worker;

pub use pool::WorkerPool;
pub use worker::{handle_delivery, process_delivery, JobOutcome, WorkerContext, WorkerHandle};
