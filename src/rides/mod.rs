//! Ride domain records shared by every subsystem.

pub mod types;

use std::time::{SystemTime, UNIX_EPOCH};

pub use types::{
    validate_request, Cab, CabId, CabStatus, DriverEvent, DriverNotification, Fare, RequestError,
    RideJob, RiderId, RiderRecord, RiderStatus, RiderTicket,
};

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
