//! Geometry primitives shared by matching, sessions and fares.
//!
//! # Responsibilities
//! - Represent a lat/lng position
//! - Great-circle distance (haversine, spherical earth)
//! - Geohash cells and their 8 neighbors (see `cell.rs`)

pub mod cell;

use serde::{Deserialize, Serialize};

pub use cell::{cell_of, neighborhood, GeoError};

/// Mean earth radius used for all distances, in km.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are finite and within range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance to `other` in km.
    pub fn distance_km(&self, other: &Position) -> f64 {
        haversine_km(*self, *other)
    }
}

/// Haversine distance between two positions in km.
pub fn haversine_km(a: Position, b: Position) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}
