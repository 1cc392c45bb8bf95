//! Trip identifier allocation.
//!
//! Riders without a client-supplied ID get one from the allocator. The
//! allocator is the seam to a persistent trip store. Allocated IDs live at
//! or above [`ALLOCATED_ID_FLOOR`]; client-supplied rider IDs must stay
//! below it, so the two never share a `rider:<id>` record.

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Lowest ID the allocator hands out.
pub const ALLOCATED_ID_FLOOR: i64 = 1 << 40;

/// IDs reserved per millisecond of seed time, so a restarted process
/// starts past everything its predecessor allocated.
const IDS_PER_MILLI: i64 = 1_000;

#[derive(Debug, Error)]
pub enum TripError {
    #[error("trip store unavailable: {0}")]
    Unavailable(String),
}

/// A new trip and the rider's row on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripIds {
    pub trip_id: i64,
    pub rider_trip_id: i64,
}

#[async_trait]
pub trait TripIdAllocator: Send + Sync {
    async fn allocate(&self) -> Result<TripIds, TripError>;
}

/// Whether `rider_id` is in the range clients may pick themselves.
pub fn is_client_rider_id(rider_id: i64) -> bool {
    rider_id > 0 && rider_id < ALLOCATED_ID_FLOOR
}

/// Process-local counters seeded from the wall clock.
#[derive(Debug, Clone)]
pub struct MemoryTripIds {
    next_trip: Arc<AtomicI64>,
    next_rider_trip: Arc<AtomicI64>,
}

impl MemoryTripIds {
    pub fn new() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(0));
        Self::starting_at(millis.saturating_mul(IDS_PER_MILLI))
    }

    /// Counters starting at `first`, raised to [`ALLOCATED_ID_FLOOR`].
    pub fn starting_at(first: i64) -> Self {
        let first = first.max(ALLOCATED_ID_FLOOR);
        Self {
            next_trip: Arc::new(AtomicI64::new(first)),
            next_rider_trip: Arc::new(AtomicI64::new(first)),
        }
    }
}

impl Default for MemoryTripIds {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TripIdAllocator for MemoryTripIds {
    async fn allocate(&self) -> Result<TripIds, TripError> {
        Ok(TripIds {
            trip_id: self.next_trip.fetch_add(1, Ordering::Relaxed),
            rider_trip_id: self.next_rider_trip.fetch_add(1, Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_sequential_and_shared_across_clones() {
        let ids = MemoryTripIds::starting_at(ALLOCATED_ID_FLOOR + 10);
        let a = ids.allocate().await.unwrap();
        let b = ids.clone().allocate().await.unwrap();
        assert_eq!(a.trip_id, ALLOCATED_ID_FLOOR + 10);
        assert_eq!(b.trip_id, ALLOCATED_ID_FLOOR + 11);
        assert_ne!(a.rider_trip_id, b.rider_trip_id);
    }

    #[tokio::test]
    async fn test_allocated_ids_never_collide_with_client_ids() {
        let low = MemoryTripIds::starting_at(1).allocate().await.unwrap();
        assert_eq!(low.rider_trip_id, ALLOCATED_ID_FLOOR);
        assert!(!is_client_rider_id(low.rider_trip_id));

        let seeded = MemoryTripIds::new().allocate().await.unwrap();
        assert!(!is_client_rider_id(seeded.rider_trip_id));

        assert!(is_client_rider_id(1));
        assert!(is_client_rider_id(ALLOCATED_ID_FLOOR - 1));
        assert!(!is_client_rider_id(0));
    }

    #[tokio::test]
    async fn test_restart_allocates_past_previous_run() {
        let earlier = MemoryTripIds::new().allocate().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let later = MemoryTripIds::new().allocate().await.unwrap();
        assert!(later.rider_trip_id > earlier.rider_trip_id);
    }
}
