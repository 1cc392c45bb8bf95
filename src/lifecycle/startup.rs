//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the configured store and queue backends
//! - Return unacknowledged jobs from a previous run to the match queue
//! - Assemble the worker pool and the HTTP state from shared services
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Services are built once and shared by `Arc`

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::{BackendKind, MatcherConfig};
use crate::dispatch::{WorkerContext, WorkerPool};
use crate::fare::FareCalculator;
use crate::http::AppState;
use crate::matching::MatchEngine;
use crate::queue::{JobQueue, MemoryQueue, QueueError, RedisQueue};
use crate::session::SessionContext;
use crate::store::{GeoStore, MemoryStore, RedisStore, StoreError};
use crate::trips::{MemoryTripIds, TripIdAllocator};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store startup failed: {0}")]
    Store(#[from] StoreError),

    #[error("queue startup failed: {0}")]
    Queue(#[from] QueueError),
}

/// Shared collaborators of the process.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn GeoStore>,
    pub queue: Arc<dyn JobQueue>,
    pub trips: Arc<dyn TripIdAllocator>,
}

impl Services {
    /// In-process store, queue and trip IDs.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            queue: Arc::new(MemoryQueue::new()),
            trips: Arc::new(MemoryTripIds::new()),
        }
    }

    pub fn match_engine(&self, config: &MatcherConfig) -> MatchEngine {
        MatchEngine::new(
            self.store.clone(),
            config.matching.cab_capacity,
            config.matching.stale_after_secs,
            config.matching.reference_point(),
        )
    }

    pub fn worker_pool(&self, config: &MatcherConfig) -> WorkerPool {
        let ctx = WorkerContext {
            engine: self.match_engine(config),
            queue: self.queue.clone(),
            retries: config.retries.clone(),
        };
        WorkerPool::new(
            ctx,
            config.queue.match_queue.clone(),
            config.workers.count,
            Duration::from_millis(config.queue.poll_timeout_ms),
        )
    }

    pub fn app_state(&self, config: &MatcherConfig) -> AppState {
        AppState {
            sessions: Arc::new(SessionContext::from_config(
                config,
                self.store.clone(),
                self.queue.clone(),
                self.trips.clone(),
            )),
            fares: FareCalculator::new(
                self.store.clone(),
                config.fare.clone(),
                config.matching.reference_point(),
                config.matching.geohash_precision,
            ),
            store: self.store.clone(),
            queue: self.queue.clone(),
        }
    }
}

/// Connect the backends selected in `config`.
pub async fn build_services(config: &MatcherConfig) -> Result<Services, StartupError> {
    let store: Arc<dyn GeoStore> = match config.store.backend {
        BackendKind::Redis => Arc::new(RedisStore::connect(&config.store.redis_url).await?),
        BackendKind::Memory => Arc::new(MemoryStore::new()),
    };
    store.ping().await?;

    let queue: Arc<dyn JobQueue> = match config.queue.backend {
        BackendKind::Redis => {
            let queue =
                RedisQueue::connect(&config.queue.redis_url, &config.queue.consumer_name).await?;
            queue.recover_in_flight(&config.queue.match_queue).await?;
            Arc::new(queue)
        }
        BackendKind::Memory => Arc::new(MemoryQueue::with_max_depth(config.queue.memory_max_depth)),
    };
    queue.ping().await?;

    info!(
        store = ?config.store.backend,
        queue = ?config.queue.backend,
        "Services connected"
    );

    Ok(Services {
        store,
        queue,
        trips: Arc::new(MemoryTripIds::new()),
    })
}
