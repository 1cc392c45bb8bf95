//! Rider session flows over in-process connections.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use ride_matcher::config::MatcherConfig;
use ride_matcher::lifecycle::{Services, Shutdown};
use ride_matcher::queue::{Delivery, JobQueue, MemoryQueue, QueueError, QueueResult};
use ride_matcher::rides::{unix_now, DriverEvent, DriverNotification, RiderStatus, RiderTicket};
use ride_matcher::session::{RiderSession, ServerMessage, SessionContext, SessionOutcome};
use ride_matcher::store::{AssignOutcome, GeoStore, MemoryStore};
use ride_matcher::trips::{MemoryTripIds, ALLOCATED_ID_FLOOR};

mod common;
use common::{
    client_connection, next_message, ride_request, seed_cab, test_config, CANCEL, PICKUP, PICKUP_CELL,
};

struct Harness {
    ctx: Arc<SessionContext>,
    store: MemoryStore,
    queue: MemoryQueue,
}

fn harness(config: &MatcherConfig) -> Harness {
    let store = MemoryStore::new();
    let queue = MemoryQueue::new();
    let ctx = Arc::new(SessionContext::from_config(
        config,
        Arc::new(store.clone()),
        Arc::new(queue.clone()),
        Arc::new(MemoryTripIds::new()),
    ));
    Harness { ctx, store, queue }
}

fn start_session(
    ctx: Arc<SessionContext>,
) -> (
    mpsc::UnboundedSender<Result<String, ride_matcher::session::SessionError>>,
    mpsc::Receiver<ServerMessage>,
    tokio::task::JoinHandle<SessionOutcome>,
) {
    let (client_tx, inbound) = client_connection();
    let (out_tx, out_rx) = mpsc::channel(64);
    let handle = tokio::spawn(RiderSession::new(ctx, out_tx).run(inbound));
    (client_tx, out_rx, handle)
}

async fn outcome_of(handle: tokio::task::JoinHandle<SessionOutcome>) -> SessionOutcome {
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("session did not finish")
        .unwrap()
}

#[tokio::test]
async fn test_end_to_end_match_opens_new_cab() {
    let config = test_config();
    let services = Services::in_memory();
    let shutdown = Shutdown::new();
    let pool = tokio::spawn(services.worker_pool(&config).run(shutdown.subscribe()));
    let ctx = services.app_state(&config).sessions;

    let (client, mut server, handle) = start_session(ctx);
    client.send(Ok(ride_request(101, 0))).unwrap();

    assert_eq!(next_message(&mut server, 2).await, ServerMessage::searching());

    let cab_id = loop {
        match next_message(&mut server, 5).await {
            ServerMessage::Status {
                status: RiderStatus::Matched,
                cab_id: Some(cab_id),
                msg,
            } => {
                assert_eq!(msg.as_deref(), Some("Driver found!"));
                break cab_id;
            }
            ServerMessage::Status {
                status: RiderStatus::Pending,
                ..
            } => continue,
            other => panic!("unexpected message {other:?}"),
        }
    };

    assert_eq!(
        outcome_of(handle).await,
        SessionOutcome::Matched {
            cab_id: cab_id.clone()
        }
    );

    let rider = services.store.rider(101).await.unwrap().unwrap();
    assert_eq!(rider.status, RiderStatus::Matched);
    assert_eq!(rider.cab_id.as_deref(), Some(cab_id.as_str()));
    assert!(!services.store.waiting_riders(PICKUP_CELL).await.unwrap().contains(&101));
    assert_eq!(services.store.cab(&cab_id).await.unwrap().unwrap().passenger_count, 1);

    shutdown.trigger();
    pool.await.unwrap();
}

#[tokio::test]
async fn test_end_to_end_match_joins_nearby_cab() {
    let config = test_config();
    let services = Services::in_memory();
    seed_cab(services.store.as_ref(), "nearby", PICKUP, 1, 0).await;
    let shutdown = Shutdown::new();
    let pool = tokio::spawn(services.worker_pool(&config).run(shutdown.subscribe()));

    let (client, _server, handle) = start_session(services.app_state(&config).sessions);
    client.send(Ok(ride_request(102, 1))).unwrap();

    assert_eq!(
        outcome_of(handle).await,
        SessionOutcome::Matched {
            cab_id: "nearby".to_string()
        }
    );
    let cab = services.store.cab("nearby").await.unwrap().unwrap();
    assert_eq!(cab.passenger_count, 2);
    assert_eq!(cab.luggage_count, 1);

    shutdown.trigger();
    pool.await.unwrap();
}

#[tokio::test]
async fn test_cancel_during_grace_window_rolls_back() {
    let mut config = test_config();
    config.session.grace_period_ms = 2_000;
    let h = harness(&config);

    let (client, mut server, handle) = start_session(h.ctx.clone());
    client.send(Ok(ride_request(201, 0))).unwrap();
    assert_eq!(next_message(&mut server, 2).await, ServerMessage::searching());
    assert!(h.store.waiting_riders(PICKUP_CELL).await.unwrap().contains(&201));

    client.send(Ok(CANCEL.to_string())).unwrap();
    client.send(Ok(CANCEL.to_string())).unwrap();

    assert_eq!(next_message(&mut server, 2).await, ServerMessage::cancelled(None));
    assert_eq!(outcome_of(handle).await, SessionOutcome::Cancelled);

    assert!(h.store.rider(201).await.unwrap().is_none());
    assert!(h.store.waiting_riders(PICKUP_CELL).await.unwrap().is_empty());
    assert!(h.queue.drain(&config.queue.match_queue).await.is_empty());
    assert!(!h.ctx.registry.is_active(201));
}

#[tokio::test]
async fn test_cancel_while_polling_rolls_back() {
    let config = test_config();
    let h = harness(&config);

    let (client, mut server, handle) = start_session(h.ctx.clone());
    client.send(Ok(ride_request(202, 0))).unwrap();
    assert_eq!(next_message(&mut server, 2).await, ServerMessage::searching());

    // No workers run, so the job waits on the queue and the rider keeps polling.
    assert_eq!(next_message(&mut server, 2).await, ServerMessage::pending());
    client.send(Ok(CANCEL.to_string())).unwrap();

    assert_eq!(outcome_of(handle).await, SessionOutcome::Cancelled);
    assert!(h.store.rider(202).await.unwrap().is_none());
    assert!(h.store.waiting_riders(PICKUP_CELL).await.unwrap().is_empty());
    assert_eq!(h.queue.drain(&config.queue.match_queue).await.len(), 1);
}

#[tokio::test]
async fn test_disconnect_rolls_back() {
    let mut config = test_config();
    config.session.grace_period_ms = 2_000;
    let h = harness(&config);

    let (client, mut server, handle) = start_session(h.ctx.clone());
    client.send(Ok(ride_request(203, 0))).unwrap();
    assert_eq!(next_message(&mut server, 2).await, ServerMessage::searching());

    drop(client);

    assert_eq!(outcome_of(handle).await, SessionOutcome::Disconnected);
    assert!(h.store.rider(203).await.unwrap().is_none());
    assert!(h.store.waiting_riders(PICKUP_CELL).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelling_a_seated_rider_frees_the_seat_and_tells_the_driver() {
    let mut config = test_config();
    config.session.grace_period_ms = 2_000;
    let h = harness(&config);
    seed_cab(&h.store, "c1", PICKUP, 1, 0).await;

    let (client, mut server, handle) = start_session(h.ctx.clone());
    client.send(Ok(ride_request(204, 1))).unwrap();
    assert_eq!(next_message(&mut server, 2).await, ServerMessage::searching());

    // Seat the rider behind the session's back before it starts polling.
    let ticket = RiderTicket {
        rider_id: 204,
        position: PICKUP,
        cell: PICKUP_CELL.to_string(),
        luggage: 1,
        tolerance_km: 5.0,
    };
    assert_eq!(
        h.store.try_assign("c1", &ticket, unix_now()).await.unwrap(),
        AssignOutcome::Assigned
    );
    client.send(Ok(CANCEL.to_string())).unwrap();

    assert_eq!(outcome_of(handle).await, SessionOutcome::Cancelled);

    let cab = h.store.cab("c1").await.unwrap().unwrap();
    assert_eq!(cab.passenger_count, 1);
    assert_eq!(cab.luggage_count, 0);
    assert!(h.store.cab_riders("c1").await.unwrap().is_empty());
    assert!(h.store.rider(204).await.unwrap().is_none());

    let notifications = h.queue.drain(&config.queue.notify_queue).await;
    assert_eq!(notifications.len(), 1);
    let event: DriverNotification = serde_json::from_str(&notifications[0]).unwrap();
    assert_eq!(event.cab_id, "c1");
    assert_eq!(event.rider_id, 204);
    assert_eq!(event.event, DriverEvent::RiderCancelled);
}

#[tokio::test]
async fn test_requests_that_cannot_be_served_are_rejected() {
    let config = test_config();
    let h = harness(&config);

    let (client, mut server, handle) = start_session(h.ctx.clone());
    client.send(Ok(ride_request(301, 4))).unwrap();
    assert!(matches!(
        next_message(&mut server, 2).await,
        ServerMessage::Error { .. }
    ));
    assert_eq!(outcome_of(handle).await, SessionOutcome::Rejected);
    assert!(h.store.rider(301).await.unwrap().is_none());

    let (client, mut server, handle) = start_session(h.ctx.clone());
    client.send(Ok(ride_request(302, u32::MAX))).unwrap();
    assert!(matches!(
        next_message(&mut server, 2).await,
        ServerMessage::Error { .. }
    ));
    assert_eq!(outcome_of(handle).await, SessionOutcome::Rejected);
    assert!(h.store.rider(302).await.unwrap().is_none());

    let (client, mut server, handle) = start_session(h.ctx.clone());
    client.send(Ok(ride_request(0, 0))).unwrap();
    assert_eq!(
        next_message(&mut server, 2).await,
        ServerMessage::error("invalid rider ID")
    );
    assert_eq!(outcome_of(handle).await, SessionOutcome::Rejected);

    let (client, mut server, handle) = start_session(h.ctx.clone());
    client.send(Ok("hello".to_string())).unwrap();
    assert_eq!(
        next_message(&mut server, 2).await,
        ServerMessage::error("invalid ride request")
    );
    assert_eq!(outcome_of(handle).await, SessionOutcome::Rejected);
}

#[tokio::test]
async fn test_second_session_for_same_rider_is_rejected() {
    let mut config = test_config();
    config.session.grace_period_ms = 2_000;
    let h = harness(&config);

    let (first_client, mut first_server, first) = start_session(h.ctx.clone());
    first_client.send(Ok(ride_request(401, 0))).unwrap();
    assert_eq!(next_message(&mut first_server, 2).await, ServerMessage::searching());

    let (second_client, mut second_server, second) = start_session(h.ctx.clone());
    second_client.send(Ok(ride_request(401, 0))).unwrap();
    assert_eq!(
        next_message(&mut second_server, 2).await,
        ServerMessage::error("ride already in progress")
    );
    assert_eq!(outcome_of(second).await, SessionOutcome::Rejected);

    first_client.send(Ok(CANCEL.to_string())).unwrap();
    assert_eq!(outcome_of(first).await, SessionOutcome::Cancelled);
}

#[tokio::test]
async fn test_server_allocates_rider_id_when_omitted() {
    let mut config = test_config();
    config.session.grace_period_ms = 2_000;
    let h = harness(&config);

    let (client, mut server, handle) = start_session(h.ctx.clone());
    client
        .send(Ok(r#"{"lat":23.2599,"lng":77.4126,"tolerance":1.0}"#.to_string()))
        .unwrap();
    assert_eq!(next_message(&mut server, 2).await, ServerMessage::searching());
    let waiting = h.store.waiting_riders(PICKUP_CELL).await.unwrap();
    assert_eq!(waiting.len(), 1);
    let allocated = *waiting.iter().next().unwrap();
    assert!(allocated >= ALLOCATED_ID_FLOOR);
    assert!(h.store.rider(allocated).await.unwrap().is_some());

    client.send(Ok(CANCEL.to_string())).unwrap();
    assert_eq!(outcome_of(handle).await, SessionOutcome::Cancelled);
}

#[tokio::test]
async fn test_client_cannot_claim_an_allocated_rider_id() {
    let config = test_config();
    let h = harness(&config);

    let (client, mut server, handle) = start_session(h.ctx.clone());
    client.send(Ok(ride_request(ALLOCATED_ID_FLOOR + 5, 0))).unwrap();
    assert_eq!(
        next_message(&mut server, 2).await,
        ServerMessage::error("rider ID is reserved for server allocation")
    );
    assert_eq!(outcome_of(handle).await, SessionOutcome::Rejected);
    assert!(h.store.rider(ALLOCATED_ID_FLOOR + 5).await.unwrap().is_none());
}

#[tokio::test]
async fn test_max_wait_cancels_the_ride() {
    let mut config = test_config();
    config.session.max_wait_secs = 1;
    config.session.poll_interval_ms = 100;
    let h = harness(&config);

    let (client, mut server, handle) = start_session(h.ctx.clone());
    client.send(Ok(ride_request(501, 0))).unwrap();

    assert_eq!(outcome_of(handle).await, SessionOutcome::Cancelled);

    let mut last = None;
    while let Ok(message) = server.try_recv() {
        last = Some(message);
    }
    assert_eq!(
        last,
        Some(ServerMessage::cancelled(Some("No shared ride found in time")))
    );
    assert!(h.store.rider(501).await.unwrap().is_none());
}

/// Accepts deliveries but refuses every publish.
struct RefusingQueue;

#[async_trait]
impl JobQueue for RefusingQueue {
    async fn publish(&self, _queue: &str, _payload: String) -> QueueResult<()> {
        Err(QueueError::Unavailable("refused".into()))
    }

    async fn next_delivery(&self, _queue: &str, _timeout: Duration) -> QueueResult<Option<Delivery>> {
        Ok(None)
    }

    async fn ack(&self, _delivery: &Delivery) -> QueueResult<()> {
        Ok(())
    }

    async fn nack(&self, _delivery: &Delivery, _requeue: bool) -> QueueResult<()> {
        Ok(())
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_publish_failure_rolls_back_and_reports_error() {
    let config = test_config();
    let store = MemoryStore::new();
    let ctx = Arc::new(SessionContext::from_config(
        &config,
        Arc::new(store.clone()),
        Arc::new(RefusingQueue),
        Arc::new(MemoryTripIds::new()),
    ));

    let (client, mut server, handle) = start_session(ctx);
    client.send(Ok(ride_request(601, 0))).unwrap();

    assert_eq!(next_message(&mut server, 2).await, ServerMessage::searching());
    assert_eq!(
        next_message(&mut server, 2).await,
        ServerMessage::error("failed to queue ride request")
    );
    assert_eq!(outcome_of(handle).await, SessionOutcome::Failed);
    assert!(store.rider(601).await.unwrap().is_none());
    assert!(store.waiting_riders(PICKUP_CELL).await.unwrap().is_empty());
}
