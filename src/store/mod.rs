//! Geo-index store subsystem.
//!
//! # Data Flow
//! ```text
//! Rider session ──presence / status / rollback──┐
//! Matcher ──────cell lookups / cab reads────────┼──▶ GeoStore ──▶ redis_store.rs (hashes, sets, Lua)
//! Assignment ───atomic seat reservation─────────┤              └▶ memory.rs (single critical section)
//! Fare calculator ──waiting count / cache───────┘
//! ```
//!
//! # Design Decisions
//! - The store is never locked by callers; every read-modify-write that must
//!   be race-free is one store-side atomic operation
//! - Timestamps are passed in by callers so staleness is testable
//! - Key layout lives in `keys.rs` and is shared by both backends

pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod scripts;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

use crate::geo::Position;
use crate::rides::{Cab, CabId, RiderId, RiderRecord, RiderTicket};

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the command.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded.
    #[error("corrupt record at '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// An atomic script returned something outside its contract.
    #[error("unexpected script reply {reply} from {script}")]
    UnexpectedReply { script: &'static str, reply: i64 },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an atomic seat reservation or cab creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// The rider now holds a seat.
    Assigned,
    /// The cab stopped being compatible after the matcher read it.
    LostRace,
    /// The rider is no longer PENDING (cancelled, deleted or already matched).
    RiderNotWaiting,
}

impl AssignOutcome {
    pub(crate) fn from_reply(script: &'static str, reply: i64) -> StoreResult<Self> {
        match reply {
            1 => Ok(AssignOutcome::Assigned),
            0 => Ok(AssignOutcome::LostRace),
            -1 => Ok(AssignOutcome::RiderNotWaiting),
            other => Err(StoreError::UnexpectedReply { script, reply: other }),
        }
    }
}

/// Contract of the shared geo-index store.
#[async_trait]
pub trait GeoStore: Send + Sync {
    /// Round-trip check used by the health route.
    async fn ping(&self) -> StoreResult<()>;

    /// Write the rider record as PENDING and add it to its cell's waiting
    /// pool, issued together.
    async fn register_presence(&self, rider: &RiderRecord) -> StoreResult<()>;

    async fn rider(&self, rider_id: RiderId) -> StoreResult<Option<RiderRecord>>;

    /// Mark an existing rider CANCELLED. Returns false when no record exists.
    async fn mark_rider_cancelled(&self, rider_id: RiderId, now: i64) -> StoreResult<bool>;

    async fn remove_from_waiting_pool(&self, rider_id: RiderId, cell: &str) -> StoreResult<()>;

    async fn delete_rider(&self, rider_id: RiderId) -> StoreResult<()>;

    async fn waiting_riders(&self, cell: &str) -> StoreResult<BTreeSet<RiderId>>;

    async fn waiting_count(&self, cell: &str) -> StoreResult<u64>;

    /// Put a cab online under `cell`.
    async fn register_cab(&self, cab: &Cab, cell: &str) -> StoreResult<()>;

    async fn cab(&self, cab_id: &str) -> StoreResult<Option<Cab>>;

    async fn cab_riders(&self, cab_id: &str) -> StoreResult<BTreeSet<RiderId>>;

    /// Union of the cab sets registered under `cells`.
    async fn cabs_in_cells(&self, cells: &[String]) -> StoreResult<BTreeSet<CabId>>;

    /// Refresh a cab's position and timestamp. Returns false for unknown cabs.
    async fn heartbeat_cab(&self, cab_id: &str, position: Position, now: i64)
        -> StoreResult<bool>;

    /// Atomically reserve a seat on `cab_id` for `rider`.
    async fn try_assign(
        &self,
        cab_id: &str,
        rider: &RiderTicket,
        now: i64,
    ) -> StoreResult<AssignOutcome>;

    /// Atomically create `cab` holding only `rider`, index it under the
    /// rider's cell and mark the rider MATCHED.
    async fn create_cab(&self, cab: &Cab, rider: &RiderTicket) -> StoreResult<AssignOutcome>;

    /// Atomically give back `rider_id`'s seat. Returns false when the rider
    /// was not a member, which makes repeated releases no-ops.
    async fn release_seat(&self, cab_id: &str, rider_id: RiderId) -> StoreResult<bool>;

    async fn cached_fare(&self, key: &str) -> StoreResult<Option<f64>>;

    async fn cache_fare(&self, key: &str, amount: f64, ttl: Duration) -> StoreResult<()>;
}
