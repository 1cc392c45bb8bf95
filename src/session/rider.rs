//! Rider session state machine.
//!
//! ```text
//! INIT ──request──▶ PENDING ──poll sees MATCHED──▶ MATCHED
//!                      │
//!                      ├── CANCEL_RIDE / max wait ──▶ rollback ──▶ CANCELLED
//!                      └── connection lost ─────────▶ rollback ──▶ DISCONNECTED
//! ```
//!
//! The session is transport-agnostic: inbound text frames arrive as a
//! stream, outbound messages leave through a channel.

use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::geo::cell_of;
use crate::rides::{unix_now, validate_request, CabId, RideJob, RiderId, RiderRecord, RiderStatus};
use crate::session::protocol::{ControlMessage, RideRequestMessage, ServerMessage};
use crate::session::rollback::rollback;
use crate::session::{SessionContext, SessionError};
use crate::trips::is_client_rider_id;

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Matched { cab_id: CabId },
    Cancelled,
    Disconnected,
    /// The request was refused before any state was written.
    Rejected,
    /// Infrastructure failure; any written state was rolled back.
    Failed,
}

/// Why the main flow stopped waiting.
enum Interrupt {
    Cancel,
    Disconnect,
    Timeout,
}

/// The rider's registered presence.
struct Presence {
    rider_id: RiderId,
    cell: String,
}

/// One rider's session.
pub struct RiderSession {
    ctx: Arc<SessionContext>,
    outbound: mpsc::Sender<ServerMessage>,
}

impl RiderSession {
    pub fn new(ctx: Arc<SessionContext>, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self { ctx, outbound }
    }

    /// Drive the session to completion.
    pub async fn run<S>(self, mut inbound: S) -> SessionOutcome
    where
        S: Stream<Item = Result<String, SessionError>> + Send + Unpin + 'static,
    {
        let request = match inbound.next().await {
            Some(Ok(text)) => text,
            Some(Err(e)) => {
                debug!(error = %e, "Connection failed before ride request");
                return SessionOutcome::Disconnected;
            }
            None => return SessionOutcome::Disconnected,
        };

        let request: RideRequestMessage = match serde_json::from_str(&request) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Unparseable ride request");
                self.send(ServerMessage::error("invalid ride request")).await;
                return SessionOutcome::Rejected;
            }
        };

        let rider_id = match request.rider_id {
            Some(id) if id > 0 && !is_client_rider_id(id) => {
                self.send(ServerMessage::error("rider ID is reserved for server allocation"))
                    .await;
                return SessionOutcome::Rejected;
            }
            Some(id) => id,
            None => match self.ctx.trips.allocate().await {
                Ok(ids) => ids.rider_trip_id,
                Err(e) => {
                    warn!(error = %e, "Failed to allocate rider ID");
                    self.send(ServerMessage::error("failed to allocate rider")).await;
                    return SessionOutcome::Failed;
                }
            },
        };

        let position = request.position();
        if let Err(e) = validate_request(
            rider_id,
            position,
            request.luggage,
            request.tolerance,
            self.ctx.cab_capacity,
        ) {
            self.send(ServerMessage::error(e.to_string())).await;
            return SessionOutcome::Rejected;
        }

        let Some(_claim) = self.ctx.registry.claim(rider_id) else {
            self.send(ServerMessage::error("ride already in progress")).await;
            return SessionOutcome::Rejected;
        };

        let cell = match cell_of(position, self.ctx.geohash_precision) {
            Ok(cell) => cell,
            Err(e) => {
                self.send(ServerMessage::error(e.to_string())).await;
                return SessionOutcome::Rejected;
            }
        };

        let record = RiderRecord {
            id: rider_id,
            position,
            cell: cell.clone(),
            luggage: request.luggage,
            detour_factor: request.tolerance,
            status: RiderStatus::Pending,
            cab_id: None,
            last_update_ts: unix_now(),
        };
        if let Err(e) = self.ctx.store.register_presence(&record).await {
            warn!(rider_id = rider_id, error = %e, "Failed to register rider presence");
            self.send(ServerMessage::error("failed to add rider")).await;
            return SessionOutcome::Failed;
        }

        info!(rider_id = rider_id, cell = %cell, "Rider waiting");
        let presence = Presence { rider_id, cell };
        self.send(ServerMessage::searching()).await;

        let (cancel_tx, mut cancel_rx) = mpsc::channel::<()>(1);
        let (disconnect_tx, mut disconnect_rx) = watch::channel(false);
        let listener = tokio::spawn(listen(inbound, rider_id, cancel_tx, disconnect_tx));

        let outcome = self
            .wait_for_match(&request, &presence, &mut cancel_rx, &mut disconnect_rx)
            .await;

        listener.abort();
        outcome
    }

    async fn wait_for_match(
        &self,
        request: &RideRequestMessage,
        presence: &Presence,
        cancel_rx: &mut mpsc::Receiver<()>,
        disconnect_rx: &mut watch::Receiver<bool>,
    ) -> SessionOutcome {
        let deadline = tokio::time::sleep(Duration::from_secs(self.ctx.session.max_wait_secs));
        tokio::pin!(deadline);

        let grace = tokio::time::sleep(Duration::from_millis(self.ctx.session.grace_period_ms));
        tokio::pin!(grace);

        tokio::select! {
            _ = &mut grace => {}
            Some(()) = cancel_rx.recv() => return self.finish(presence, Interrupt::Cancel).await,
            _ = disconnected(disconnect_rx) => return self.finish(presence, Interrupt::Disconnect).await,
            _ = &mut deadline => return self.finish(presence, Interrupt::Timeout).await,
        }

        let job = RideJob {
            rider_id: presence.rider_id,
            lat: request.lat,
            lng: request.lng,
            geohash: presence.cell.clone(),
            luggage: request.luggage,
            tolerance: request.tolerance,
        };
        if let Err(e) = self.publish(&job).await {
            warn!(rider_id = presence.rider_id, error = %e, "Failed to queue ride request");
            self.rollback(presence).await;
            self.send(ServerMessage::error("failed to queue ride request")).await;
            return SessionOutcome::Failed;
        }
        debug!(rider_id = presence.rider_id, "Ride request queued");

        let mut poll = tokio::time::interval(Duration::from_millis(self.ctx.session.poll_interval_ms));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                Some(()) = cancel_rx.recv() => return self.finish(presence, Interrupt::Cancel).await,
                _ = disconnected(disconnect_rx) => return self.finish(presence, Interrupt::Disconnect).await,
                _ = &mut deadline => return self.finish(presence, Interrupt::Timeout).await,
                _ = poll.tick() => {}
            }

            match self.ctx.store.rider(presence.rider_id).await {
                Ok(Some(record)) => match (record.status, record.cab_id) {
                    (RiderStatus::Matched, Some(cab_id)) => {
                        info!(rider_id = presence.rider_id, cab_id = %cab_id, "Rider matched");
                        self.send(ServerMessage::matched(cab_id.clone())).await;
                        return SessionOutcome::Matched { cab_id };
                    }
                    (RiderStatus::Cancelled, _) => {
                        return self.finish(presence, Interrupt::Cancel).await;
                    }
                    _ => {
                        if !self.send(ServerMessage::pending()).await {
                            return self.finish(presence, Interrupt::Disconnect).await;
                        }
                    }
                },
                Ok(None) => {
                    warn!(rider_id = presence.rider_id, "Rider record vanished while waiting");
                    return self.finish(presence, Interrupt::Cancel).await;
                }
                Err(e) => {
                    warn!(rider_id = presence.rider_id, error = %e, "Status poll failed");
                }
            }
        }
    }

    async fn publish(&self, job: &RideJob) -> Result<(), SessionError> {
        let payload = serde_json::to_string(job)?;
        self.ctx
            .queue
            .publish(&self.ctx.match_queue, payload)
            .await?;
        Ok(())
    }

    async fn finish(&self, presence: &Presence, why: Interrupt) -> SessionOutcome {
        self.rollback(presence).await;
        match why {
            Interrupt::Cancel => {
                info!(rider_id = presence.rider_id, "Ride cancelled by rider");
                self.send(ServerMessage::cancelled(None)).await;
                SessionOutcome::Cancelled
            }
            Interrupt::Timeout => {
                info!(rider_id = presence.rider_id, "No ride found before deadline");
                self.send(ServerMessage::cancelled(Some("No shared ride found in time")))
                    .await;
                SessionOutcome::Cancelled
            }
            Interrupt::Disconnect => {
                info!(rider_id = presence.rider_id, "Rider disconnected");
                self.send(ServerMessage::cancelled(None)).await;
                SessionOutcome::Disconnected
            }
        }
    }

    async fn rollback(&self, presence: &Presence) {
        rollback(
            self.ctx.store.as_ref(),
            self.ctx.queue.as_ref(),
            &self.ctx.notify_queue,
            presence.rider_id,
            &presence.cell,
        )
        .await;
    }

    /// Returns false once the client side is gone.
    async fn send(&self, message: ServerMessage) -> bool {
        self.outbound.send(message).await.is_ok()
    }
}

/// Reads control messages until the connection ends.
async fn listen<S>(
    mut inbound: S,
    rider_id: RiderId,
    cancel_tx: mpsc::Sender<()>,
    disconnect_tx: watch::Sender<bool>,
) where
    S: Stream<Item = Result<String, SessionError>> + Unpin,
{
    while let Some(frame) = inbound.next().await {
        let text = match frame {
            Ok(text) => text,
            Err(e) => {
                debug!(rider_id = rider_id, error = %e, "Session read failed");
                break;
            }
        };
        match serde_json::from_str::<ControlMessage>(&text) {
            Ok(ControlMessage::CancelRide) => {
                // A pending notification already covers this one.
                let _ = cancel_tx.try_send(());
            }
            Ok(ControlMessage::Unknown) | Err(_) => {
                debug!(rider_id = rider_id, "Ignoring unexpected session message");
            }
        }
    }
    let _ = disconnect_tx.send(true);
}

/// Resolves once the listener reports the connection gone.
async fn disconnected(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
