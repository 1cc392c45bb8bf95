//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the ride, fare, cab and health routes
//! - Wire up middleware (tracing, request ID, timeout)
//! - Serve on a bound listener until the shutdown signal fires

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::MatcherConfig;
use crate::fare::FareCalculator;
use crate::http::{handlers, websocket};
use crate::queue::JobQueue;
use crate::session::SessionContext;
use crate::store::GeoStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionContext>,
    pub fares: FareCalculator,
    pub store: Arc<dyn GeoStore>,
    pub queue: Arc<dyn JobQueue>,
}

/// HTTP front end of the matcher.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &MatcherConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &MatcherConfig, state: AppState) -> Router {
        Router::new()
            .route("/api/v1/ride/request", get(websocket::ride_request))
            .route("/api/v1/ride/fare", post(handlers::create_fare))
            .route("/api/v1/cab/{id}/heartbeat", post(handlers::cab_heartbeat))
            .route("/health", get(handlers::health))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server shutting down");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
