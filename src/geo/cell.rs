//! Geohash cells.
//!
//! A cell is a fixed-precision geohash string. Nearby search is bounded to a
//! cell and its 8 neighbors instead of a full spatial index.

use thiserror::Error;

use crate::geo::Position;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("invalid position ({lat}, {lng})")]
    InvalidPosition { lat: f64, lng: f64 },

    #[error("geohash error: {0}")]
    Geohash(String),
}

/// Encode `position` as a geohash cell of `precision` characters.
pub fn cell_of(position: Position, precision: usize) -> Result<String, GeoError> {
    if !position.is_valid() {
        return Err(GeoError::InvalidPosition {
            lat: position.lat,
            lng: position.lng,
        });
    }
    geohash::encode(
        geohash::Coord {
            x: position.lng,
            y: position.lat,
        },
        precision,
    )
    .map_err(|e| GeoError::Geohash(e.to_string()))
}

/// The cell itself followed by its 8 neighbors, duplicates removed.
///
/// Near the poles neighbors can coincide, so the result may hold fewer than
/// nine cells.
pub fn neighborhood(cell: &str) -> Result<Vec<String>, GeoError> {
    let n = geohash::neighbors(cell).map_err(|e| GeoError::Geohash(e.to_string()))?;

    let mut cells = vec![cell.to_string()];
    for neighbor in [n.n, n.ne, n.e, n.se, n.s, n.sw, n.w, n.nw] {
        if !cells.contains(&neighbor) {
            cells.push(neighbor);
        }
    }
    Ok(cells)
}
