//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, trace / request-id / timeout layers)
//!     → websocket.rs  GET  /api/v1/ride/request      (rider session)
//!     → handlers.rs   POST /api/v1/ride/fare         (fare quote)
//!                     POST /api/v1/cab/{id}/heartbeat (cab position)
//!                     GET  /health
//! ```

pub mod handlers;
pub mod server;
pub mod websocket;

pub use server::{AppState, HttpServer};
