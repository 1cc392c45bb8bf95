//! Durable job queue subsystem.
//!
//! Two named queues are used: the match queue carrying [`RideJob`]s and
//! the driver notification queue. Deliveries are acknowledged explicitly;
//! a delivery that is neither acked nor nacked is recovered on restart by
//! the redis backend.
//!
//! [`RideJob`]: crate::rides::RideJob

pub mod memory;
pub mod redis_queue;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use self::memory::MemoryQueue;
pub use self::redis_queue::RedisQueue;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("malformed envelope on '{queue}': {reason}")]
    Envelope { queue: String, reason: String },

    #[error("delivery {tag} on '{queue}' is not in flight")]
    UnknownDelivery { queue: String, tag: String },

    #[error("queue '{queue}' is full ({depth} messages)")]
    Full { queue: String, depth: usize },
}

pub type QueueResult<T> = Result<T, QueueError>;

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub queue: String,
    /// Backend-specific identity used to ack or nack.
    pub tag: String,
    pub payload: String,
    /// 1 on first delivery, incremented on each requeue.
    pub attempt: u32,
    /// Exact stored form, needed by backends that remove by value.
    pub(crate) raw: String,
}

/// Contract of the job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Durably publish `payload` on `queue`.
    async fn publish(&self, queue: &str, payload: String) -> QueueResult<()>;

    /// Wait up to `timeout` for the next delivery on `queue`.
    async fn next_delivery(&self, queue: &str, timeout: Duration)
        -> QueueResult<Option<Delivery>>;

    /// Remove a delivery permanently.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Reject a delivery, putting it back for redelivery when `requeue`.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()>;

    async fn ping(&self) -> QueueResult<()>;
}

/// Stored form of a message. The id keeps identical payloads distinct.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub(crate) struct Envelope {
    pub id: String,
    pub attempts: u32,
    pub payload: String,
}

impl Envelope {
    pub(crate) fn new(payload: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            attempts: 1,
            payload,
        }
    }

    pub(crate) fn retried(&self) -> Self {
        Self {
            id: self.id.clone(),
            attempts: self.attempts.saturating_add(1),
            payload: self.payload.clone(),
        }
    }

    pub(crate) fn encode(&self, queue: &str) -> QueueResult<String> {
        serde_json::to_string(self).map_err(|e| QueueError::Envelope {
            queue: queue.to_string(),
            reason: e.to_string(),
        })
    }

    pub(crate) fn decode(queue: &str, raw: &str) -> QueueResult<Self> {
        serde_json::from_str(raw).map_err(|e| QueueError::Envelope {
            queue: queue.to_string(),
            reason: e.to_string(),
        })
    }

    pub(crate) fn into_delivery(self, queue: &str, raw: String) -> Delivery {
        Delivery {
            queue: queue.to_string(),
            tag: self.id,
            payload: self.payload,
            attempt: self.attempts,
            raw,
        }
    }
}
