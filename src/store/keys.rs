//! Store key layout.

use crate::geo::Position;
use crate::rides::RiderId;

pub fn rider(rider_id: RiderId) -> String {
    format!("rider:{rider_id}")
}

pub fn cab(cab_id: &str) -> String {
    format!("cab:{cab_id}")
}

pub fn cab_riders(cab_id: &str) -> String {
    format!("cab:{cab_id}:riders")
}

pub fn cell_cabs(cell: &str) -> String {
    format!("cell:{cell}:cabs")
}

pub fn waiting_pool(cell: &str) -> String {
    format!("pool:cell:{cell}:waiting")
}

pub fn fare(cell: &str, position: Position) -> String {
    format!("fare:{cell}:{:.6}:{:.6}", position.lat, position.lng)
}
