//! Shared utilities for integration tests.

#![allow(dead_code)]

use futures_util::Stream;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

use ride_matcher::config::{BackendKind, MatcherConfig};
use ride_matcher::geo::Position;
use ride_matcher::rides::{unix_now, Cab, CabStatus, RideJob, RiderRecord, RiderStatus};
use ride_matcher::session::{ServerMessage, SessionError};
use ride_matcher::store::GeoStore;

/// Pickup point used across tests; geohash cell `tsph3d` at precision 6.
pub const PICKUP: Position = Position {
    lat: 23.2599,
    lng: 77.4126,
};
pub const PICKUP_CELL: &str = "tsph3d";

/// Memory backends and timings short enough for tests.
pub fn test_config() -> MatcherConfig {
    let mut config = MatcherConfig::default();
    config.store.backend = BackendKind::Memory;
    config.queue.backend = BackendKind::Memory;
    config.queue.poll_timeout_ms = 20;
    config.workers.count = 4;
    config.session.grace_period_ms = 20;
    config.session.poll_interval_ms = 10;
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 5;
    config
}

/// A position `km` kilometres due north of [`PICKUP`].
pub fn north_of_pickup(km: f64) -> Position {
    Position::new(PICKUP.lat + km / 111.195, PICKUP.lng)
}

/// Register an available cab under the pickup cell.
pub async fn seed_cab(
    store: &dyn GeoStore,
    id: &str,
    position: Position,
    passengers: u32,
    luggage: u32,
) -> Cab {
    let cab = Cab {
        id: id.to_string(),
        position,
        capacity: 4,
        passenger_count: passengers,
        luggage_count: luggage,
        min_tolerance_km: Some(50.0),
        status: CabStatus::Available,
        last_update_ts: unix_now(),
    };
    store.register_cab(&cab, PICKUP_CELL).await.unwrap();
    cab
}

/// Register a PENDING rider at the pickup and return its job.
pub async fn waiting_rider(store: &dyn GeoStore, rider_id: i64, luggage: u32) -> RideJob {
    store
        .register_presence(&RiderRecord {
            id: rider_id,
            position: PICKUP,
            cell: PICKUP_CELL.to_string(),
            luggage,
            detour_factor: 1.0,
            status: RiderStatus::Pending,
            cab_id: None,
            last_update_ts: unix_now(),
        })
        .await
        .unwrap();
    RideJob {
        rider_id,
        lat: PICKUP.lat,
        lng: PICKUP.lng,
        geohash: PICKUP_CELL.to_string(),
        luggage,
        tolerance: 1.0,
    }
}

/// Client side of an in-process session connection. Dropping the sender
/// ends the stream like a closed socket.
pub fn client_connection() -> (
    mpsc::UnboundedSender<Result<String, SessionError>>,
    impl Stream<Item = Result<String, SessionError>> + Send + Unpin + 'static,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));
    (tx, stream)
}

pub fn ride_request(rider_id: i64, luggage: u32) -> String {
    serde_json::json!({
        "rider_id": rider_id,
        "lat": PICKUP.lat,
        "lng": PICKUP.lng,
        "luggage": luggage,
        "tolerance": 1.0,
    })
    .to_string()
}

pub const CANCEL: &str = r#"{"type":"CANCEL_RIDE"}"#;

/// Next server message, failing the test after `secs`.
pub async fn next_message(rx: &mut mpsc::Receiver<ServerMessage>, secs: u64) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(secs), rx.recv())
        .await
        .expect("timed out waiting for a server message")
        .expect("session closed its outbound channel")
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
