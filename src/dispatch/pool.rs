//! Dispatcher loop over the idle-worker registry.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::dispatch::worker::{Worker, WorkerContext, WorkerHandle};
use crate::queue::JobQueue;
use crate::resilience::calculate_backoff;

/// Fixed-size pool of matching workers fed from one queue.
pub struct WorkerPool {
    ctx: Arc<WorkerContext>,
    queue_name: String,
    worker_count: usize,
    poll_timeout: Duration,
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

impl WorkerPool {
    pub fn new(
        ctx: WorkerContext,
        queue_name: impl Into<String>,
        worker_count: usize,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            ctx: Arc::new(ctx),
            queue_name: queue_name.into(),
            worker_count: worker_count.max(1),
            poll_timeout,
        }
    }

    /// Dispatch deliveries to idle workers until `shutdown` fires, then
    /// wait for in-flight jobs to finish.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let (idle_tx, mut idle_rx) = mpsc::channel::<WorkerHandle>(self.worker_count);

        let mut workers = JoinSet::new();
        for id in 0..self.worker_count {
            workers.spawn(Worker::new(id, self.ctx.clone(), idle_tx.clone()).run());
        }
        drop(idle_tx);

        info!(
            workers = self.worker_count,
            queue = %self.queue_name,
            "Worker pool started"
        );

        let queue: &dyn JobQueue = self.ctx.queue.as_ref();
        let mut consecutive_errors = 0u32;

        'dispatch: loop {
            let worker = tokio::select! {
                _ = shutdown.recv() => break 'dispatch,
                handle = idle_rx.recv() => match handle {
                    Some(handle) => handle,
                    None => {
                        error!(queue = %self.queue_name, "All workers exited, dispatcher stopping");
                        break 'dispatch;
                    }
                },
            };

            let delivery = loop {
                if shutdown_requested(&mut shutdown) {
                    break 'dispatch;
                }
                match queue.next_delivery(&self.queue_name, self.poll_timeout).await {
                    Ok(Some(delivery)) => {
                        consecutive_errors = 0;
                        break delivery;
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        consecutive_errors = consecutive_errors.saturating_add(1);
                        let delay = calculate_backoff(
                            consecutive_errors,
                            self.ctx.retries.base_delay_ms,
                            self.ctx.retries.max_delay_ms,
                        );
                        warn!(error = %e, delay = ?delay, "Queue receive failed");
                        tokio::time::sleep(delay).await;
                    }
                }
            };

            if let Err(delivery) = worker.job.send(delivery) {
                warn!(worker_id = worker.id, "Worker vanished, requeueing delivery");
                if let Err(e) = queue.nack(&delivery, true).await {
                    warn!(error = %e, "Failed to requeue orphaned delivery");
                }
            }
        }

        info!("Worker pool draining");
        drop(idle_rx);
        while workers.join_next().await.is_some() {}
        info!("Worker pool stopped");
    }
}
