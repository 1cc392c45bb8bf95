//! In-process geo-index store.
//!
//! Every operation runs inside one critical section over the whole state,
//! which gives the same linearizability the redis backend gets from Lua.
//! The lock is never held across an await point.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::geo::Position;
use crate::rides::{Cab, CabId, CabStatus, RiderId, RiderRecord, RiderStatus, RiderTicket};
use crate::store::{AssignOutcome, GeoStore, StoreResult};

#[derive(Default)]
struct State {
    riders: HashMap<RiderId, RiderRecord>,
    cabs: HashMap<CabId, Cab>,
    cab_riders: HashMap<CabId, BTreeSet<RiderId>>,
    cell_cabs: HashMap<String, BTreeSet<CabId>>,
    waiting: HashMap<String, BTreeSet<RiderId>>,
    fares: HashMap<String, (f64, Instant)>,
}

impl State {
    fn rider_is_pending(&self, rider_id: RiderId) -> bool {
        self.riders
            .get(&rider_id)
            .is_some_and(|r| r.status == RiderStatus::Pending)
    }

    fn leave_waiting_pool(&mut self, rider_id: RiderId, cell: &str) {
        if let Some(pool) = self.waiting.get_mut(cell) {
            pool.remove(&rider_id);
            if pool.is_empty() {
                self.waiting.remove(cell);
            }
        }
    }

    fn mark_matched(&mut self, rider_id: RiderId, cab_id: &str, now: i64) {
        if let Some(rider) = self.riders.get_mut(&rider_id) {
            rider.status = RiderStatus::Matched;
            rider.cab_id = Some(cab_id.to_string());
            rider.last_update_ts = now;
        }
    }
}

/// A thread-safe in-memory [`GeoStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic inside a critical section never leaves a half-applied
        // mutation behind, so a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GeoStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn register_presence(&self, rider: &RiderRecord) -> StoreResult<()> {
        let mut state = self.lock();
        let mut record = rider.clone();
        record.status = RiderStatus::Pending;
        record.cab_id = None;
        state
            .waiting
            .entry(record.cell.clone())
            .or_default()
            .insert(record.id);
        state.riders.insert(record.id, record);
        Ok(())
    }

    async fn rider(&self, rider_id: RiderId) -> StoreResult<Option<RiderRecord>> {
        Ok(self.lock().riders.get(&rider_id).cloned())
    }

    async fn mark_rider_cancelled(&self, rider_id: RiderId, now: i64) -> StoreResult<bool> {
        let mut state = self.lock();
        match state.riders.get_mut(&rider_id) {
            Some(rider) => {
                rider.status = RiderStatus::Cancelled;
                rider.last_update_ts = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_from_waiting_pool(&self, rider_id: RiderId, cell: &str) -> StoreResult<()> {
        self.lock().leave_waiting_pool(rider_id, cell);
        Ok(())
    }

    async fn delete_rider(&self, rider_id: RiderId) -> StoreResult<()> {
        self.lock().riders.remove(&rider_id);
        Ok(())
    }

    async fn waiting_riders(&self, cell: &str) -> StoreResult<BTreeSet<RiderId>> {
        Ok(self.lock().waiting.get(cell).cloned().unwrap_or_default())
    }

    async fn waiting_count(&self, cell: &str) -> StoreResult<u64> {
        Ok(self.lock().waiting.get(cell).map_or(0, |p| p.len() as u64))
    }

    async fn register_cab(&self, cab: &Cab, cell: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.cabs.insert(cab.id.clone(), cab.clone());
        state
            .cell_cabs
            .entry(cell.to_string())
            .or_default()
            .insert(cab.id.clone());
        Ok(())
    }

    async fn cab(&self, cab_id: &str) -> StoreResult<Option<Cab>> {
        Ok(self.lock().cabs.get(cab_id).cloned())
    }

    async fn cab_riders(&self, cab_id: &str) -> StoreResult<BTreeSet<RiderId>> {
        Ok(self.lock().cab_riders.get(cab_id).cloned().unwrap_or_default())
    }

    async fn cabs_in_cells(&self, cells: &[String]) -> StoreResult<BTreeSet<CabId>> {
        let state = self.lock();
        Ok(cells
            .iter()
            .filter_map(|cell| state.cell_cabs.get(cell))
            .flatten()
            .cloned()
            .collect())
    }

    async fn heartbeat_cab(
        &self,
        cab_id: &str,
        position: Position,
        now: i64,
    ) -> StoreResult<bool> {
        let mut state = self.lock();
        match state.cabs.get_mut(cab_id) {
            Some(cab) => {
                cab.position = position;
                cab.last_update_ts = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn try_assign(
        &self,
        cab_id: &str,
        rider: &RiderTicket,
        now: i64,
    ) -> StoreResult<AssignOutcome> {
        let mut state = self.lock();

        if !state.rider_is_pending(rider.rider_id) {
            return Ok(AssignOutcome::RiderNotWaiting);
        }

        let Some(cab) = state.cabs.get_mut(cab_id) else {
            return Ok(AssignOutcome::LostRace);
        };
        if cab.status != CabStatus::Available || !cab.fits(rider.luggage) {
            return Ok(AssignOutcome::LostRace);
        }

        cab.passenger_count += 1;
        cab.luggage_count += rider.luggage;
        cab.min_tolerance_km = Some(match cab.min_tolerance_km {
            Some(current) => current.min(rider.tolerance_km),
            None => rider.tolerance_km,
        });
        if cab.occupancy() >= cab.capacity {
            cab.status = CabStatus::Full;
        }

        state.mark_matched(rider.rider_id, cab_id, now);
        state
            .cab_riders
            .entry(cab_id.to_string())
            .or_default()
            .insert(rider.rider_id);
        state.leave_waiting_pool(rider.rider_id, &rider.cell);

        Ok(AssignOutcome::Assigned)
    }

    async fn create_cab(&self, cab: &Cab, rider: &RiderTicket) -> StoreResult<AssignOutcome> {
        let mut state = self.lock();

        if !state.rider_is_pending(rider.rider_id) {
            return Ok(AssignOutcome::RiderNotWaiting);
        }

        state.cabs.insert(cab.id.clone(), cab.clone());
        state
            .cab_riders
            .insert(cab.id.clone(), BTreeSet::from([rider.rider_id]));
        state
            .cell_cabs
            .entry(rider.cell.clone())
            .or_default()
            .insert(cab.id.clone());
        state.mark_matched(rider.rider_id, &cab.id, cab.last_update_ts);
        state.leave_waiting_pool(rider.rider_id, &rider.cell);

        Ok(AssignOutcome::Assigned)
    }

    async fn release_seat(&self, cab_id: &str, rider_id: RiderId) -> StoreResult<bool> {
        let mut state = self.lock();

        let was_member = state
            .cab_riders
            .get_mut(cab_id)
            .is_some_and(|members| members.remove(&rider_id));
        if !was_member {
            return Ok(false);
        }

        let luggage = state.riders.get(&rider_id).map_or(0, |r| r.luggage);
        if let Some(cab) = state.cabs.get_mut(cab_id) {
            cab.passenger_count = cab.passenger_count.saturating_sub(1);
            cab.luggage_count = cab.luggage_count.saturating_sub(luggage);
            if cab.occupancy() < cab.capacity {
                cab.status = CabStatus::Available;
            }
        }
        Ok(true)
    }

    async fn cached_fare(&self, key: &str) -> StoreResult<Option<f64>> {
        let mut state = self.lock();
        match state.fares.get(key) {
            Some((amount, expires)) if *expires > Instant::now() => Ok(Some(*amount)),
            Some(_) => {
                state.fares.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn cache_fare(&self, key: &str, amount: f64, ttl: Duration) -> StoreResult<()> {
        self.lock()
            .fares
            .insert(key.to_string(), (amount, Instant::now() + ttl));
        Ok(())
    }
}
