//! In-process job queue for single-node runs and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};

use crate::queue::{Delivery, Envelope, JobQueue, QueueError, QueueResult};

/// Depth used by [`MemoryQueue::new`].
pub const DEFAULT_MAX_DEPTH: usize = 10_000;

struct Channel {
    tx: mpsc::Sender<Envelope>,
    rx: Mutex<mpsc::Receiver<Envelope>>,
}

impl Channel {
    fn new(max_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(max_depth);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

/// [`JobQueue`] backed by one bounded channel per named queue.
///
/// Consumers of the same queue share the receiver, so every message goes
/// to exactly one of them. A queue holding `max_depth` messages refuses
/// further publishes with [`QueueError::Full`].
#[derive(Clone)]
pub struct MemoryQueue {
    channels: Arc<DashMap<String, Arc<Channel>>>,
    in_flight: Arc<DashMap<String, Envelope>>,
    max_depth: usize,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            max_depth: max_depth.max(1),
        }
    }

    fn channel(&self, queue: &str) -> Arc<Channel> {
        self.channels
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(Channel::new(self.max_depth)))
            .clone()
    }

    fn enqueue(&self, queue: &str, envelope: Envelope) -> QueueResult<()> {
        self.channel(queue).tx.try_send(envelope).map_err(|err| match err {
            TrySendError::Full(_) => QueueError::Full {
                queue: queue.to_string(),
                depth: self.max_depth,
            },
            TrySendError::Closed(_) => QueueError::Unavailable(format!("queue '{queue}' is closed")),
        })
    }

    /// Take every ready message off `queue` without acknowledging anything.
    pub async fn drain(&self, queue: &str) -> Vec<String> {
        let channel = self.channel(queue);
        let mut rx = channel.rx.lock().await;
        let mut payloads = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            payloads.push(envelope.payload);
        }
        payloads
    }

    /// Number of deliveries handed out and not yet acked or nacked.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn publish(&self, queue: &str, payload: String) -> QueueResult<()> {
        self.enqueue(queue, Envelope::new(payload))
    }

    async fn next_delivery(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> QueueResult<Option<Delivery>> {
        let channel = self.channel(queue);
        let received = tokio::time::timeout(timeout, async {
            let mut rx = channel.rx.lock().await;
            rx.recv().await
        })
        .await;

        match received {
            Ok(Some(envelope)) => {
                self.in_flight.insert(envelope.id.clone(), envelope.clone());
                Ok(Some(envelope.into_delivery(queue, String::new())))
            }
            Ok(None) => Err(QueueError::Unavailable(format!("queue '{queue}' is closed"))),
            Err(_) => Ok(None),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        self.in_flight
            .remove(&delivery.tag)
            .map(|_| ())
            .ok_or_else(|| QueueError::UnknownDelivery {
                queue: delivery.queue.clone(),
                tag: delivery.tag.clone(),
            })
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> QueueResult<()> {
        let (_, envelope) =
            self.in_flight
                .remove(&delivery.tag)
                .ok_or_else(|| QueueError::UnknownDelivery {
                    queue: delivery.queue.clone(),
                    tag: delivery.tag.clone(),
                })?;
        if requeue {
            self.enqueue(&delivery.queue, envelope.retried())?;
        }
        Ok(())
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_publish_then_deliver_then_ack() {
        let queue = MemoryQueue::new();
        queue.publish("jobs", "a".into()).await.unwrap();

        let delivery = queue.next_delivery("jobs", WAIT).await.unwrap().unwrap();
        assert_eq!(delivery.payload, "a");
        assert_eq!(delivery.attempt, 1);
        assert_eq!(queue.in_flight(), 1);

        queue.ack(&delivery).await.unwrap();
        assert_eq!(queue.in_flight(), 0);
        assert!(queue.next_delivery("jobs", WAIT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nack_requeues_with_next_attempt() {
        let queue = MemoryQueue::new();
        queue.publish("jobs", "a".into()).await.unwrap();

        let first = queue.next_delivery("jobs", WAIT).await.unwrap().unwrap();
        queue.nack(&first, true).await.unwrap();

        let second = queue.next_delivery("jobs", WAIT).await.unwrap().unwrap();
        assert_eq!(second.tag, first.tag);
        assert_eq!(second.attempt, 2);

        queue.nack(&second, false).await.unwrap();
        assert!(queue.next_delivery("jobs", WAIT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_double_ack_is_reported() {
        let queue = MemoryQueue::new();
        queue.publish("jobs", "a".into()).await.unwrap();
        let delivery = queue.next_delivery("jobs", WAIT).await.unwrap().unwrap();
        queue.ack(&delivery).await.unwrap();
        assert!(matches!(
            queue.ack(&delivery).await,
            Err(QueueError::UnknownDelivery { .. })
        ));
    }

    #[tokio::test]
    async fn test_full_queue_refuses_publish() {
        let queue = MemoryQueue::with_max_depth(2);
        queue.publish("notify", "a".into()).await.unwrap();
        queue.publish("notify", "b".into()).await.unwrap();
        assert!(matches!(
            queue.publish("notify", "c".into()).await,
            Err(QueueError::Full { depth: 2, .. })
        ));

        // Other queues keep their own room.
        queue.publish("jobs", "x".into()).await.unwrap();

        let delivery = queue.next_delivery("notify", WAIT).await.unwrap().unwrap();
        queue.ack(&delivery).await.unwrap();
        queue.publish("notify", "c".into()).await.unwrap();
        assert_eq!(queue.drain("notify").await, vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let queue = MemoryQueue::new();
        queue.publish("one", "x".into()).await.unwrap();
        queue.publish("two", "y".into()).await.unwrap();

        assert_eq!(queue.drain("two").await, vec!["y".to_string()]);
        assert_eq!(queue.drain("one").await, vec!["x".to_string()]);
    }
}
