//! JSON handlers for fares, cab heartbeats and health.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::fare::FareError;
use crate::geo::Position;
use crate::http::server::AppState;
use crate::rides::unix_now;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareQuoteRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareQuoteResponse {
    pub fare_id: i64,
    pub fare: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub lat: f64,
    pub lng: f64,
}

/// `POST /api/v1/ride/fare`
pub async fn create_fare(
    State(state): State<AppState>,
    Json(request): Json<FareQuoteRequest>,
) -> impl IntoResponse {
    match state.fares.quote(Position::new(request.lat, request.lng)).await {
        Ok(fare) => (
            StatusCode::CREATED,
            Json(FareQuoteResponse {
                fare_id: fare.id,
                fare: fare.amount,
            }),
        )
            .into_response(),
        Err(e @ (FareError::InvalidPosition { .. } | FareError::Geo(_))) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(FareError::Store(e)) => {
            tracing::error!(error = %e, "Failed to quote fare");
            (StatusCode::SERVICE_UNAVAILABLE, "Fare service unavailable").into_response()
        }
    }
}

/// `POST /api/v1/cab/{id}/heartbeat`
pub async fn cab_heartbeat(
    State(state): State<AppState>,
    Path(cab_id): Path<String>,
    Json(request): Json<HeartbeatRequest>,
) -> impl IntoResponse {
    let position = Position::new(request.lat, request.lng);
    if !position.is_valid() {
        return (StatusCode::BAD_REQUEST, "Invalid position").into_response();
    }

    match state.store.heartbeat_cab(&cab_id, position, unix_now()).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, "Cab not found").into_response(),
        Err(e) => {
            tracing::error!(cab_id = %cab_id, error = %e, "Heartbeat failed");
            (StatusCode::SERVICE_UNAVAILABLE, "Store unavailable").into_response()
        }
    }
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.store.ping().await {
        tracing::warn!(error = %e, "Health check: store unreachable");
        return (StatusCode::SERVICE_UNAVAILABLE, "store unavailable");
    }
    if let Err(e) = state.queue.ping().await {
        tracing::warn!(error = %e, "Health check: queue unreachable");
        return (StatusCode::SERVICE_UNAVAILABLE, "queue unavailable");
    }
    (StatusCode::OK, "OK")
}
