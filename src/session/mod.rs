//! Rider session subsystem.
//!
//! # Data Flow
//! ```text
//! client ──request──▶ rider.rs ──presence──▶ GeoStore
//!                        │ grace window
//!                        ├──RideJob──▶ JobQueue (match queue)
//!                        ├──poll status──▶ GeoStore ──▶ status frames ──▶ client
//!                        └──cancel / disconnect──▶ rollback.rs ──▶ GeoStore + notify queue
//! ```
//!
//! # Design Decisions
//! - Only the main flow touches the store; the listener task just raises
//!   signals, so rollback never runs twice concurrently
//! - A rider can have at most one live session per process (registry.rs)

pub mod protocol;
pub mod registry;
pub mod rider;
pub mod rollback;

use std::sync::Arc;
use thiserror::Error;

use crate::config::{MatcherConfig, SessionConfig};
use crate::queue::{JobQueue, QueueError};
use crate::store::GeoStore;
use crate::trips::TripIdAllocator;

pub use protocol::{ControlMessage, RideRequestMessage, ServerMessage};
pub use registry::{SessionGuard, SessionRegistry};
pub use rider::{RiderSession, SessionOutcome};
pub use rollback::{rollback, RollbackReport};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    Transport(String),

    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Collaborators and settings shared by every session.
pub struct SessionContext {
    pub store: Arc<dyn GeoStore>,
    pub queue: Arc<dyn JobQueue>,
    pub trips: Arc<dyn TripIdAllocator>,
    pub registry: SessionRegistry,
    pub session: SessionConfig,
    pub match_queue: String,
    pub notify_queue: String,
    pub geohash_precision: usize,
    pub cab_capacity: u32,
}

impl SessionContext {
    pub fn from_config(
        config: &MatcherConfig,
        store: Arc<dyn GeoStore>,
        queue: Arc<dyn JobQueue>,
        trips: Arc<dyn TripIdAllocator>,
    ) -> Self {
        Self {
            store,
            queue,
            trips,
            registry: SessionRegistry::new(),
            session: config.session.clone(),
            match_queue: config.queue.match_queue.clone(),
            notify_queue: config.queue.notify_queue.clone(),
            geohash_precision: config.matching.geohash_precision,
            cab_capacity: config.matching.cab_capacity,
        }
    }
}
