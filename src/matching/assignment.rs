//! Greedy assignment: join the best nearby cab or open a new one.

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::geo::Position;
use crate::matching::matcher::Matcher;
use crate::matching::MatchError;
use crate::rides::{Cab, CabId, CabStatus, RideJob, RiderTicket};
use crate::store::{AssignOutcome, GeoStore};

/// What happened to one rider job.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    /// The rider took a seat in an existing cab.
    Joined { cab_id: CabId },
    /// No compatible cab existed, so one was created for the rider.
    NewCab { cab_id: CabId },
    /// The chosen cab changed underneath; the job must be retried.
    LostRace { cab_id: CabId },
    /// The rider is no longer waiting; the job is finished.
    RiderNotWaiting,
}

/// Runs the matcher and commits its choice atomically.
#[derive(Clone)]
pub struct MatchEngine {
    store: Arc<dyn GeoStore>,
    matcher: Matcher,
    cab_capacity: u32,
    reference: Position,
}

impl MatchEngine {
    pub fn new(
        store: Arc<dyn GeoStore>,
        cab_capacity: u32,
        stale_after_secs: i64,
        reference: Position,
    ) -> Self {
        Self {
            matcher: Matcher::new(store.clone(), stale_after_secs),
            store,
            cab_capacity,
            reference,
        }
    }

    pub fn cab_capacity(&self) -> u32 {
        self.cab_capacity
    }

    /// Match the rider described by `job`.
    ///
    /// The store re-validates the cab and the rider inside one atomic step,
    /// so a stale candidate surfaces as [`MatchResult::LostRace`] rather
    /// than an overbooking.
    pub async fn match_rider(&self, job: &RideJob, now: i64) -> Result<MatchResult, MatchError> {
        let rider = job.ticket(self.reference);

        if let Some(candidate) = self.matcher.find_candidate(&rider, now).await? {
            debug!(
                rider_id = rider.rider_id,
                cab_id = %candidate.cab_id,
                distance_km = candidate.distance_km,
                "Trying candidate cab"
            );
            let outcome = self.store.try_assign(&candidate.cab_id, &rider, now).await?;
            return Ok(match outcome {
                AssignOutcome::Assigned => {
                    info!(rider_id = rider.rider_id, cab_id = %candidate.cab_id, "Rider joined cab");
                    MatchResult::Joined {
                        cab_id: candidate.cab_id,
                    }
                }
                AssignOutcome::LostRace => MatchResult::LostRace {
                    cab_id: candidate.cab_id,
                },
                AssignOutcome::RiderNotWaiting => MatchResult::RiderNotWaiting,
            });
        }

        self.open_cab(&rider, now).await
    }

    async fn open_cab(&self, rider: &RiderTicket, now: i64) -> Result<MatchResult, MatchError> {
        let cab = new_cab_for(rider, self.cab_capacity, now);
        let cab_id = cab.id.clone();

        match self.store.create_cab(&cab, rider).await? {
            AssignOutcome::Assigned => {
                info!(rider_id = rider.rider_id, cab_id = %cab_id, "Opened new cab for rider");
                Ok(MatchResult::NewCab { cab_id })
            }
            AssignOutcome::RiderNotWaiting => Ok(MatchResult::RiderNotWaiting),
            AssignOutcome::LostRace => Ok(MatchResult::LostRace { cab_id }),
        }
    }
}

/// A fresh cab at the rider's position carrying only that rider.
pub fn new_cab_for(rider: &RiderTicket, capacity: u32, now: i64) -> Cab {
    let occupancy = rider.luggage.saturating_add(1);
    Cab {
        id: Uuid::new_v4().to_string(),
        position: rider.position,
        capacity,
        passenger_count: 1,
        luggage_count: rider.luggage,
        min_tolerance_km: Some(rider.tolerance_km),
        status: if occupancy >= capacity {
            CabStatus::Full
        } else {
            CabStatus::Available
        },
        last_update_ts: now,
    }
}
