//! WebSocket transport for rider sessions.
//!
//! # Data Flow
//! ```text
//! client frames ──▶ text stream ──▶ RiderSession ──▶ mpsc ──▶ writer task ──▶ client frames
//! ```
//!
//! # Design Decisions
//! - Binary, ping and pong frames never reach the session
//! - A close frame or read error ends the inbound stream
//! - The writer closes the socket once the session drops its sender

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::http::server::AppState;
use crate::session::{RiderSession, ServerMessage, SessionContext, SessionError};

/// `GET /api/v1/ride/request`
pub async fn ride_request(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_session(socket, state.sessions))
}

async fn serve_session(socket: WebSocket, ctx: Arc<SessionContext>) {
    let (mut sink, stream) = socket.split();

    let inbound = Box::pin(stream.filter_map(|frame| async move {
        match frame {
            Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
            Ok(Message::Close(_)) => Some(Err(SessionError::Transport("closed by client".into()))),
            Ok(_) => None,
            Err(e) => Some(Err(SessionError::Transport(e.to_string()))),
        }
    }));

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(ctx.session.outbound_buffer);
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    debug!(error = %e, "Failed to encode session message");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let outcome = RiderSession::new(ctx, outbound_tx).run(inbound).await;
    info!(outcome = ?outcome, "Rider session finished");

    let _ = writer.await;
}
