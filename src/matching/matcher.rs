//! Candidate cab selection.
//!
//! # Responsibilities
//! - Collect cabs registered in the rider's cell and its 8 neighbors
//! - Drop absent, FULL and stale cabs
//! - Keep cabs with room for the rider and within their tolerance
//! - Pick the nearest, lowest cab ID on ties
//!
//! # Design Decisions
//! - Selection is a pure function over fetched cabs so it can be tested
//!   without a store
//! - The result is only a hint; the assignment step re-checks everything

use std::cmp::Ordering;
use std::sync::Arc;
use tracing::trace;

use crate::geo::neighborhood;
use crate::matching::MatchError;
use crate::rides::{Cab, CabId, CabStatus, RiderTicket};
use crate::store::GeoStore;

/// The chosen cab and its distance from the rider.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub cab_id: CabId,
    pub distance_km: f64,
}

/// Whether `cab` may take `rider`, and at what distance.
fn compatibility(cab: &Cab, rider: &RiderTicket, now: i64, stale_after_secs: i64) -> Option<f64> {
    if cab.status != CabStatus::Available || cab.is_stale(now, stale_after_secs) {
        return None;
    }
    if !cab.fits(rider.luggage) {
        return None;
    }

    let distance_km = rider.position.distance_km(&cab.position);
    match cab.min_tolerance_km {
        Some(tolerance) if distance_km > tolerance => None,
        _ => Some(distance_km),
    }
}

/// Pick the nearest compatible cab.
pub fn select_best(
    cabs: &[Cab],
    rider: &RiderTicket,
    now: i64,
    stale_after_secs: i64,
) -> Option<Candidate> {
    cabs.iter()
        .filter_map(|cab| {
            compatibility(cab, rider, now, stale_after_secs).map(|distance_km| Candidate {
                cab_id: cab.id.clone(),
                distance_km,
            })
        })
        .min_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.cab_id.cmp(&b.cab_id))
        })
}

/// Reads candidate cabs from the store and applies [`select_best`].
#[derive(Clone)]
pub struct Matcher {
    store: Arc<dyn GeoStore>,
    stale_after_secs: i64,
}

impl Matcher {
    pub fn new(store: Arc<dyn GeoStore>, stale_after_secs: i64) -> Self {
        Self {
            store,
            stale_after_secs,
        }
    }

    /// Find the best cab for `rider`, or `None` when nothing nearby fits.
    pub async fn find_candidate(
        &self,
        rider: &RiderTicket,
        now: i64,
    ) -> Result<Option<Candidate>, MatchError> {
        let cells = neighborhood(&rider.cell)?;
        let cab_ids = self.store.cabs_in_cells(&cells).await?;

        let mut cabs = Vec::with_capacity(cab_ids.len());
        for cab_id in &cab_ids {
            if let Some(cab) = self.store.cab(cab_id).await? {
                cabs.push(cab);
            }
        }

        let best = select_best(&cabs, rider, now, self.stale_after_secs);
        trace!(
            rider_id = rider.rider_id,
            scanned = cabs.len(),
            chosen = ?best.as_ref().map(|c| &c.cab_id),
            "Candidate search finished"
        );
        Ok(best)
    }
}
