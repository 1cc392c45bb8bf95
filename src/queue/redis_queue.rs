//! Redis list-backed job queue.
//!
//! Each queue is a list; messages are JSON envelopes. A consumer moves a
//! message into its own processing list with BLMOVE, which keeps the
//! message stored until it is acked. Messages left in the processing
//! list by a crashed consumer go back to the queue on the next start.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::queue::{Delivery, Envelope, JobQueue, QueueError, QueueResult};

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        QueueError::Unavailable(err.to_string())
    }
}

fn list_key(queue: &str) -> String {
    format!("queue:{queue}")
}

fn processing_key(queue: &str, consumer: &str) -> String {
    format!("queue:{queue}:processing:{consumer}")
}

/// [`JobQueue`] over redis lists.
pub struct RedisQueue {
    conn: MultiplexedConnection,
    /// Blocking pops get their own connection so they never stall
    /// publishes and acks.
    blocking: Mutex<MultiplexedConnection>,
    consumer: String,
}

impl RedisQueue {
    pub async fn connect(redis_url: &str, consumer: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        let blocking = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            conn,
            blocking: Mutex::new(blocking),
            consumer: consumer.to_string(),
        })
    }

    /// Return messages this consumer left unacknowledged to `queue`.
    pub async fn recover_in_flight(&self, queue: &str) -> QueueResult<usize> {
        let mut conn = self.conn.clone();
        let processing = processing_key(queue, &self.consumer);
        let mut recovered = 0;

        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&processing)
                .arg(list_key(queue))
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            info!(
                queue = queue,
                consumer = %self.consumer,
                recovered = recovered,
                "Requeued unacknowledged deliveries"
            );
        }
        Ok(recovered)
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn publish(&self, queue: &str, payload: String) -> QueueResult<()> {
        let raw = Envelope::new(payload).encode(queue)?;
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(list_key(queue), raw).await?;
        Ok(())
    }

    async fn next_delivery(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> QueueResult<Option<Delivery>> {
        let processing = processing_key(queue, &self.consumer);
        let raw: Option<String> = {
            let mut conn = self.blocking.lock().await;
            redis::cmd("BLMOVE")
                .arg(list_key(queue))
                .arg(&processing)
                .arg("RIGHT")
                .arg("LEFT")
                .arg(timeout.as_secs_f64().max(0.01))
                .query_async(&mut *conn)
                .await?
        };

        let Some(raw) = raw else {
            return Ok(None);
        };

        match Envelope::decode(queue, &raw) {
            Ok(envelope) => Ok(Some(envelope.into_delivery(queue, raw))),
            Err(err) => {
                // Nothing can ever consume it, so take it out of rotation.
                warn!(queue = queue, error = %err, "Dropping malformed message");
                let mut conn = self.conn.clone();
                let _: () = conn.lrem(&processing, 1, &raw).await?;
                Err(err)
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .lrem(processing_key(&delivery.queue, &self.consumer), 1, &delivery.raw)
            .await?;
        if removed == 0 {
            return Err(QueueError::UnknownDelivery {
                queue: delivery.queue.clone(),
                tag: delivery.tag.clone(),
            });
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()> {
        let processing = processing_key(&delivery.queue, &self.consumer);
        let mut pipe = redis::pipe();
        pipe.atomic().lrem(&processing, 1, &delivery.raw).ignore();

        if requeue {
            let envelope = Envelope::decode(&delivery.queue, &delivery.raw)?.retried();
            pipe.lpush(list_key(&delivery.queue), envelope.encode(&delivery.queue)?)
                .ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(list_key("ride-matching"), "queue:ride-matching");
        assert_eq!(
            processing_key("ride-matching", "matcher-1"),
            "queue:ride-matching:processing:matcher-1"
        );
    }
}
