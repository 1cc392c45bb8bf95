//! Full service over real sockets: HTTP server, WebSocket sessions and the
//! worker pool on in-memory backends.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use ride_matcher::lifecycle::{Services, Shutdown};
use ride_matcher::rides::RiderStatus;
use ride_matcher::session::ServerMessage;
use ride_matcher::store::GeoStore;
use ride_matcher::HttpServer;

mod common;
use common::{ride_request, seed_cab, test_config, CANCEL, PICKUP, PICKUP_CELL};

struct RunningService {
    addr: SocketAddr,
    services: Services,
    shutdown: Shutdown,
    server: JoinHandle<Result<(), std::io::Error>>,
    pool: JoinHandle<()>,
}

impl RunningService {
    async fn start(with_workers: bool) -> Self {
        let mut config = test_config();
        if !with_workers {
            config.session.grace_period_ms = 2_000;
        }
        let services = Services::in_memory();
        let shutdown = Shutdown::new();

        let pool = if with_workers {
            tokio::spawn(services.worker_pool(&config).run(shutdown.subscribe()))
        } else {
            tokio::spawn(async {})
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = HttpServer::new(&config, services.app_state(&config));
        let server = tokio::spawn(server.run(listener, shutdown.subscribe()));

        Self {
            addr,
            services,
            shutdown,
            server,
            pool,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/api/v1/ride/request", self.addr)
    }

    async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.server)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.pool)
            .await
            .expect("pool did not stop")
            .unwrap();
    }
}

type Socket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Next decoded server message, skipping non-text frames.
async fn next_server_message(socket: &mut Socket) -> Option<ServerMessage> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame")?
            .ok()?;
        match frame {
            Message::Text(_) => {
                return Some(serde_json::from_str(frame.to_text().unwrap()).unwrap());
            }
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rider_matched_over_websocket() {
    let service = RunningService::start(true).await;
    seed_cab(service.services.store.as_ref(), "cab-7", PICKUP, 1, 0).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(service.ws_url())
        .await
        .unwrap();
    socket.send(Message::text(ride_request(42, 1))).await.unwrap();

    assert_eq!(
        next_server_message(&mut socket).await,
        Some(ServerMessage::searching())
    );

    let matched = loop {
        match next_server_message(&mut socket).await {
            Some(message) if message.status() == Some(RiderStatus::Matched) => break message,
            Some(message) if message.status() == Some(RiderStatus::Pending) => continue,
            other => panic!("unexpected message {other:?}"),
        }
    };
    assert_eq!(matched, ServerMessage::matched("cab-7".to_string()));

    // The server closes the socket once the session ends.
    assert_eq!(next_server_message(&mut socket).await, None);

    let cab = service.services.store.cab("cab-7").await.unwrap().unwrap();
    assert_eq!(cab.passenger_count, 2);
    assert_eq!(cab.luggage_count, 1);

    service.stop().await;
}

#[tokio::test]
async fn test_rider_cancels_over_websocket() {
    let service = RunningService::start(false).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(service.ws_url())
        .await
        .unwrap();
    socket.send(Message::text(ride_request(43, 0))).await.unwrap();
    assert_eq!(
        next_server_message(&mut socket).await,
        Some(ServerMessage::searching())
    );
    assert!(service
        .services
        .store
        .waiting_riders(PICKUP_CELL)
        .await
        .unwrap()
        .contains(&43));

    socket.send(Message::text(CANCEL)).await.unwrap();
    assert_eq!(
        next_server_message(&mut socket).await,
        Some(ServerMessage::cancelled(None))
    );
    assert_eq!(next_server_message(&mut socket).await, None);

    assert!(service.services.store.rider(43).await.unwrap().is_none());
    assert!(service
        .services
        .store
        .waiting_riders(PICKUP_CELL)
        .await
        .unwrap()
        .is_empty());

    service.stop().await;
}

#[tokio::test]
async fn test_invalid_request_gets_error_frame() {
    let service = RunningService::start(false).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(service.ws_url())
        .await
        .unwrap();
    socket
        .send(Message::text(r#"{"rider_id":5,"lat":95.0,"lng":77.4,"tolerance":1.0}"#))
        .await
        .unwrap();

    assert!(matches!(
        next_server_message(&mut socket).await,
        Some(ServerMessage::Error { .. })
    ));
    assert_eq!(next_server_message(&mut socket).await, None);

    service.stop().await;
}

#[tokio::test]
async fn test_health_and_fare_over_http() {
    let service = RunningService::start(false).await;
    let client = reqwest::Client::new();

    let health = client
        .get(format!("http://{}/health", service.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    let fare = client
        .post(format!("http://{}/api/v1/ride/fare", service.addr))
        .json(&serde_json::json!({ "lat": PICKUP.lat, "lng": PICKUP.lng }))
        .send()
        .await
        .unwrap();
    assert_eq!(fare.status(), reqwest::StatusCode::CREATED);
    let body: serde_json::Value = fare.json().await.unwrap();
    assert!(body["fare"].as_f64().unwrap() >= 50.0);

    service.stop().await;
}
