//! A single matching worker and the per-job outcome policy.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::RetryConfig;
use crate::matching::{MatchEngine, MatchError, MatchResult};
use crate::observability::metrics;
use crate::queue::{Delivery, JobQueue};
use crate::resilience::retry_delay;
use crate::rides::{unix_now, CabId, RideJob};

/// Everything a worker needs to process jobs.
#[derive(Clone)]
pub struct WorkerContext {
    pub engine: MatchEngine,
    pub queue: Arc<dyn JobQueue>,
    pub retries: RetryConfig,
}

/// How one delivery ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Matched { cab_id: CabId, new_cab: bool },
    /// Cancelled, deleted or already matched by an earlier delivery.
    RiderGone,
    /// Payload did not decode as a ride job.
    Malformed,
    /// Decoded, but can never be served.
    Invalid,
    LostRace { cab_id: CabId },
    StoreFailure,
}

impl JobOutcome {
    /// Whether the job goes back on the queue.
    pub fn requeue(&self) -> bool {
        matches!(self, JobOutcome::LostRace { .. } | JobOutcome::StoreFailure)
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Matched { new_cab: false, .. } => "joined",
            JobOutcome::Matched { new_cab: true, .. } => "new_cab",
            JobOutcome::RiderGone => "rider_gone",
            JobOutcome::Malformed => "malformed",
            JobOutcome::Invalid => "invalid",
            JobOutcome::LostRace { .. } => "lost_race",
            JobOutcome::StoreFailure => "store_failure",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Decode, validate and match one delivery. Does not ack.
pub async fn process_delivery(engine: &MatchEngine, delivery: &Delivery) -> JobOutcome {
    let job: RideJob = match serde_json::from_str(&delivery.payload) {
        Ok(job) => job,
        Err(e) => {
            warn!(tag = %delivery.tag, error = %e, "Dropping malformed ride job");
            return JobOutcome::Malformed;
        }
    };

    if let Err(e) = job.validate(engine.cab_capacity()) {
        warn!(rider_id = job.rider_id, error = %e, "Dropping invalid ride job");
        return JobOutcome::Invalid;
    }

    match engine.match_rider(&job, unix_now()).await {
        Ok(MatchResult::Joined { cab_id }) => JobOutcome::Matched {
            cab_id,
            new_cab: false,
        },
        Ok(MatchResult::NewCab { cab_id }) => JobOutcome::Matched {
            cab_id,
            new_cab: true,
        },
        Ok(MatchResult::LostRace { cab_id }) => JobOutcome::LostRace { cab_id },
        Ok(MatchResult::RiderNotWaiting) => JobOutcome::RiderGone,
        Err(MatchError::Geo(e)) => {
            warn!(rider_id = job.rider_id, error = %e, "Dropping ride job with bad cell");
            JobOutcome::Invalid
        }
        Err(MatchError::Store(e)) => {
            error!(rider_id = job.rider_id, error = %e, "Store failure while matching");
            JobOutcome::StoreFailure
        }
    }
}

/// Process a delivery and settle it with the queue.
pub async fn handle_delivery(ctx: &WorkerContext, worker_id: usize, delivery: Delivery) {
    let outcome = process_delivery(&ctx.engine, &delivery).await;
    metrics::record_job(outcome.label());

    match &outcome {
        JobOutcome::Matched { cab_id, new_cab } => {
            if *new_cab {
                metrics::record_new_cab();
            }
            debug!(worker_id = worker_id, cab_id = %cab_id, "Job matched");
        }
        JobOutcome::LostRace { cab_id } => {
            metrics::record_race_lost();
            info!(
                worker_id = worker_id,
                cab_id = %cab_id,
                attempt = delivery.attempt,
                "Lost assignment race, requeueing"
            );
        }
        _ => {}
    }

    let settled = if outcome.requeue() {
        tokio::time::sleep(retry_delay(delivery.attempt, &ctx.retries)).await;
        ctx.queue.nack(&delivery, true).await
    } else {
        ctx.queue.ack(&delivery).await
    };

    if let Err(e) = settled {
        error!(
            worker_id = worker_id,
            tag = %delivery.tag,
            outcome = %outcome,
            error = %e,
            "Failed to settle delivery"
        );
    }
}

/// Handed to the dispatcher by an idle worker.
pub struct WorkerHandle {
    pub id: usize,
    pub job: oneshot::Sender<Delivery>,
}

pub(crate) struct Worker {
    id: usize,
    ctx: Arc<WorkerContext>,
    idle_tx: mpsc::Sender<WorkerHandle>,
}

impl Worker {
    pub(crate) fn new(id: usize, ctx: Arc<WorkerContext>, idle_tx: mpsc::Sender<WorkerHandle>) -> Self {
        Self { id, ctx, idle_tx }
    }

    /// Register as idle, wait for a job, process it, repeat. Returns when
    /// the dispatcher goes away.
    pub(crate) async fn run(self) {
        debug!(worker_id = self.id, "Worker started");
        loop {
            let (job_tx, job_rx) = oneshot::channel();
            let handle = WorkerHandle {
                id: self.id,
                job: job_tx,
            };
            if self.idle_tx.send(handle).await.is_err() {
                break;
            }

            match job_rx.await {
                Ok(delivery) => handle_delivery(&self.ctx, self.id, delivery).await,
                Err(_) => break,
            }
        }
        debug!(worker_id = self.id, "Worker stopped");
    }
}
