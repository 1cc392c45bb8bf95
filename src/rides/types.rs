//! Rider, cab and job records.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::geo::Position;

/// Externally assigned rider identifier. Zero is never valid.
pub type RiderId = i64;

/// Opaque generated cab identifier.
pub type CabId = String;

/// Rider lifecycle status as stored and as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiderStatus {
    Pending,
    Matched,
    Cancelled,
}

impl RiderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiderStatus::Pending => "PENDING",
            RiderStatus::Matched => "MATCHED",
            RiderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RiderStatus::Pending),
            "MATCHED" => Some(RiderStatus::Matched),
            "CANCELLED" => Some(RiderStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for RiderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cab availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabStatus {
    Available,
    Full,
}

impl CabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabStatus::Available => "AVAILABLE",
            CabStatus::Full => "FULL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(CabStatus::Available),
            "FULL" => Some(CabStatus::Full),
            _ => None,
        }
    }
}

/// A rider's transient record in the geo-index store.
#[derive(Debug, Clone, PartialEq)]
pub struct RiderRecord {
    pub id: RiderId,
    pub position: Position,
    pub cell: String,
    pub luggage: u32,
    pub detour_factor: f64,
    pub status: RiderStatus,
    pub cab_id: Option<CabId>,
    pub last_update_ts: i64,
}

/// A cab's record in the geo-index store.
#[derive(Debug, Clone, PartialEq)]
pub struct Cab {
    pub id: CabId,
    pub position: Position,
    pub capacity: u32,
    pub passenger_count: u32,
    pub luggage_count: u32,
    /// Tightest tolerance among passengers so far; `None` until a passenger
    /// with a tolerance boards.
    pub min_tolerance_km: Option<f64>,
    pub status: CabStatus,
    pub last_update_ts: i64,
}

impl Cab {
    /// Seats currently taken by passengers and luggage. Saturates, so a
    /// corrupt record reads as over capacity rather than empty.
    pub fn occupancy(&self) -> u32 {
        self.passenger_count.saturating_add(self.luggage_count)
    }

    /// Whether one more passenger carrying `luggage` fits.
    pub fn fits(&self, luggage: u32) -> bool {
        self.occupancy()
            .checked_add(1)
            .and_then(|seats| seats.checked_add(luggage))
            .is_some_and(|seats| seats <= self.capacity)
    }

    /// Whether the last heartbeat is older than `stale_after_secs`.
    pub fn is_stale(&self, now: i64, stale_after_secs: i64) -> bool {
        now - self.last_update_ts > stale_after_secs
    }
}

/// The serialized request carried by one queue job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideJob {
    pub rider_id: RiderId,
    pub lat: f64,
    pub lng: f64,
    pub geohash: String,
    #[serde(default)]
    pub luggage: u32,
    /// Detour factor applied to the rider's direct distance.
    pub tolerance: f64,
}

/// Reasons a rider request can never be served.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("invalid rider ID")]
    InvalidRiderId,

    #[error("invalid position ({lat}, {lng})")]
    InvalidPosition { lat: f64, lng: f64 },

    #[error("detour factor must be a non-negative number")]
    InvalidTolerance,

    #[error("{luggage} luggage plus the rider exceeds cab capacity {capacity}")]
    TooMuchLuggage { luggage: u32, capacity: u32 },

    #[error("missing geohash cell")]
    MissingCell,
}

/// Validate the fields shared by ride requests and jobs.
pub fn validate_request(
    rider_id: RiderId,
    position: Position,
    luggage: u32,
    detour_factor: f64,
    capacity: u32,
) -> Result<(), RequestError> {
    if rider_id <= 0 {
        return Err(RequestError::InvalidRiderId);
    }
    if !position.is_valid() {
        return Err(RequestError::InvalidPosition {
            lat: position.lat,
            lng: position.lng,
        });
    }
    if !detour_factor.is_finite() || detour_factor < 0.0 {
        return Err(RequestError::InvalidTolerance);
    }
    if luggage >= capacity {
        return Err(RequestError::TooMuchLuggage { luggage, capacity });
    }
    Ok(())
}

impl RideJob {
    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lng)
    }

    pub fn validate(&self, capacity: u32) -> Result<(), RequestError> {
        validate_request(
            self.rider_id,
            self.position(),
            self.luggage,
            self.tolerance,
            capacity,
        )?;
        if self.geohash.is_empty() {
            return Err(RequestError::MissingCell);
        }
        Ok(())
    }

    /// Resolve the job into what matching needs, computing the rider's
    /// tolerance against `reference` once.
    pub fn ticket(&self, reference: Position) -> RiderTicket {
        let position = self.position();
        RiderTicket {
            rider_id: self.rider_id,
            position,
            cell: self.geohash.clone(),
            luggage: self.luggage,
            tolerance_km: self.tolerance * position.distance_km(&reference),
        }
    }
}

/// A rider as seen by the matcher and the assignment protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct RiderTicket {
    pub rider_id: RiderId,
    pub position: Position,
    pub cell: String,
    pub luggage: u32,
    pub tolerance_km: f64,
}

/// Event sent to a matched cab's driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverNotification {
    pub cab_id: CabId,
    pub rider_id: RiderId,
    pub event: DriverEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverEvent {
    RiderCancelled,
}

/// A computed fare quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fare {
    pub id: i64,
    pub amount: f64,
}
