//! Ride matching engine.
//!
//! # Data Flow
//! ```text
//! RideJob ──▶ ticket (tolerance vs reference point)
//!          ──▶ Matcher (cell + 8 neighbors, nearest compatible cab)
//!          ──▶ GeoStore::try_assign (atomic) ──▶ Joined / LostRace / RiderNotWaiting
//!          └─ no candidate ──▶ GeoStore::create_cab (atomic) ──▶ NewCab
//! ```

pub mod assignment;
pub mod matcher;

use thiserror::Error;

use crate::geo::GeoError;
use crate::store::StoreError;

pub use assignment::{new_cab_for, MatchEngine, MatchResult};
pub use matcher::{select_best, Candidate, Matcher};

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("bad rider cell: {0}")]
    Geo(#[from] GeoError),
}
