//! Compensating rollback for a cancelled or abandoned ride request.
//!
//! Each step is attempted even if an earlier one failed. Running the
//! rollback again after it completed changes nothing: the rider record is
//! gone, so there is no seat to release and no driver to notify.

use tracing::{info, warn};

use crate::observability::metrics;
use crate::queue::JobQueue;
use crate::rides::{unix_now, CabId, DriverEvent, DriverNotification, RiderId};
use crate::store::GeoStore;

/// What a rollback actually changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollbackReport {
    pub marked_cancelled: bool,
    /// Cab whose seat was given back.
    pub released_cab: Option<CabId>,
    pub driver_notified: bool,
    /// Number of steps that failed and were skipped.
    pub failed_steps: u32,
}

/// Undo a rider's presence: mark CANCELLED, leave the waiting pool, give
/// back any seat (notifying the driver), then delete the record.
pub async fn rollback(
    store: &dyn GeoStore,
    queue: &dyn JobQueue,
    notify_queue: &str,
    rider_id: RiderId,
    cell: &str,
) -> RollbackReport {
    let mut report = RollbackReport::default();

    match store.mark_rider_cancelled(rider_id, unix_now()).await {
        Ok(marked) => report.marked_cancelled = marked,
        Err(e) => {
            report.failed_steps += 1;
            warn!(rider_id = rider_id, error = %e, "Rollback: failed to mark rider cancelled");
        }
    }

    if let Err(e) = store.remove_from_waiting_pool(rider_id, cell).await {
        report.failed_steps += 1;
        warn!(rider_id = rider_id, error = %e, "Rollback: failed to leave waiting pool");
    }

    let assigned_cab = match store.rider(rider_id).await {
        Ok(record) => record.and_then(|r| r.cab_id),
        Err(e) => {
            report.failed_steps += 1;
            warn!(rider_id = rider_id, error = %e, "Rollback: failed to read rider record");
            None
        }
    };

    if let Some(cab_id) = assigned_cab {
        match store.release_seat(&cab_id, rider_id).await {
            Ok(true) => {
                report.driver_notified = notify_driver(queue, notify_queue, &cab_id, rider_id).await;
                if !report.driver_notified {
                    report.failed_steps += 1;
                }
                report.released_cab = Some(cab_id);
            }
            Ok(false) => {}
            Err(e) => {
                report.failed_steps += 1;
                warn!(
                    rider_id = rider_id,
                    cab_id = %cab_id,
                    error = %e,
                    "Rollback: failed to release seat"
                );
            }
        }
    }

    if let Err(e) = store.delete_rider(rider_id).await {
        report.failed_steps += 1;
        warn!(rider_id = rider_id, error = %e, "Rollback: failed to delete rider");
    }

    metrics::record_rollback();
    info!(
        rider_id = rider_id,
        released_cab = ?report.released_cab,
        failed_steps = report.failed_steps,
        "Rider rolled back"
    );
    report
}

async fn notify_driver(queue: &dyn JobQueue, notify_queue: &str, cab_id: &str, rider_id: RiderId) -> bool {
    let notification = DriverNotification {
        cab_id: cab_id.to_string(),
        rider_id,
        event: DriverEvent::RiderCancelled,
    };
    let payload = match serde_json::to_string(&notification) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(rider_id = rider_id, error = %e, "Rollback: failed to encode driver notification");
            return false;
        }
    };

    match queue.publish(notify_queue, payload).await {
        Ok(()) => true,
        Err(e) => {
            warn!(rider_id = rider_id, cab_id = %cab_id, error = %e, "Rollback: failed to notify driver");
            false
        }
    }
}
