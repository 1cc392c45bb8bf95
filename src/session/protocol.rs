//! Session wire messages.

use serde::{Deserialize, Serialize};

use crate::geo::Position;
use crate::rides::{CabId, RiderId, RiderStatus};

/// First message a rider sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideRequestMessage {
    /// Omitted when the server should allocate one.
    #[serde(default)]
    pub rider_id: Option<RiderId>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub luggage: u32,
    /// Detour factor.
    pub tolerance: f64,
}

impl RideRequestMessage {
    pub fn position(&self) -> Position {
        Position::new(self.lat, self.lng)
    }
}

/// Messages a rider may send after the request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "CANCEL_RIDE")]
    CancelRide,
    #[serde(other)]
    Unknown,
}

/// Messages sent to the rider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Status {
        status: RiderStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cab_id: Option<CabId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn searching() -> Self {
        ServerMessage::Status {
            status: RiderStatus::Pending,
            cab_id: None,
            msg: Some("Searching for shared ride...".to_string()),
        }
    }

    pub fn pending() -> Self {
        ServerMessage::Status {
            status: RiderStatus::Pending,
            cab_id: None,
            msg: None,
        }
    }

    pub fn matched(cab_id: CabId) -> Self {
        ServerMessage::Status {
            status: RiderStatus::Matched,
            cab_id: Some(cab_id),
            msg: Some("Driver found!".to_string()),
        }
    }

    pub fn cancelled(msg: Option<&str>) -> Self {
        ServerMessage::Status {
            status: RiderStatus::Cancelled,
            cab_id: None,
            msg: msg.map(str::to_string),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<RiderStatus> {
        match self {
            ServerMessage::Status { status, .. } => Some(*status),
            ServerMessage::Error { .. } => None,
        }
    }
}
