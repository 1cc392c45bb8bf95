//! Fare quoting.
//!
//! `fare = max(min_fare, distance × per_km × min(max_multiplier, 1 + demand_step × waiting))`
//! where `distance` is measured to the reference point and `waiting` is the
//! size of the pickup cell's waiting pool.

pub mod calculator;

use thiserror::Error;

use crate::geo::GeoError;
use crate::store::StoreError;

pub use calculator::{fare_amount, FareCalculator};

#[derive(Debug, Error)]
pub enum FareError {
    #[error("invalid position ({lat}, {lng})")]
    InvalidPosition { lat: f64, lng: f64 },

    #[error(transparent)]
    Geo(#[from] GeoError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
