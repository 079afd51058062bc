//! Integration tests for the WebSocket server.
//!
//! These tests run a real server on a loopback port and talk to it with a
//! WebSocket client:
//! - Config on connect
//! - start/stop with a single shared session
//! - Config updates broadcast to every client
//!
//! Run with: `cargo test --test server_integration`

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use tuskwatch::geo::LocalPoint;
use tuskwatch::notify::NotificationDispatcher;
use tuskwatch::server::{TrackingController, TrackingServer};
use tuskwatch::session::SessionConfig;
use tuskwatch::source::{MockConfig, SourceConfig};
use tuskwatch::zone::{Zone, ZoneRegistry};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Helper Functions
// ============================================================================

struct TestServer {
    url: String,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(frame_limit: Option<u64>) -> Self {
        let registry = ZoneRegistry::with_zones(vec![Zone::square(
            "boundary",
            LocalPoint::new(200.0, 250.0),
            100.0,
        )
        .with_label("Restricted Area")]);
        let controller = Arc::new(TrackingController::new(
            SessionConfig::default().with_frame_interval(Duration::from_millis(10)),
            registry,
            SourceConfig::mock(
                MockConfig::default()
                    .with_seed(42)
                    .with_frame_limit(frame_limit),
            ),
            NotificationDispatcher::logging(),
        ));

        let server = TrackingServer::bind("127.0.0.1:0", controller)
            .await
            .unwrap();
        let url = format!("ws://{}", server.local_addr().unwrap());
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            server.run(run_cancel).await.unwrap();
        });
        Self { url, cancel, task }
    }

    async fn connect(&self) -> Client {
        let (client, _) = connect_async(self.url.as_str()).await.unwrap();
        client
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        self.task.await.unwrap();
    }
}

async fn send(client: &mut Client, command: Value) {
    client
        .send(Message::Text(command.to_string()))
        .await
        .unwrap();
}

/// Next JSON message from the server.
async fn next_message(client: &mut Client) -> Value {
    let read = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), read)
        .await
        .expect("no message from server")
}

/// Skips messages until one of type `kind` arrives.
async fn expect_type(client: &mut Client, kind: &str) -> Value {
    loop {
        let message = next_message(client).await;
        if message["type"] == kind {
            return message;
        }
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

/// New clients are greeted with calibration and zone overlays.
#[tokio::test]
async fn test_config_on_connect() {
    let server = TestServer::start(None).await;
    let mut client = server.connect().await;

    let message = next_message(&mut client).await;
    assert_eq!(message["type"], "config");
    assert_eq!(message["data"]["status"], "connected");
    let zones = message["data"]["zones"].as_array().unwrap();
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0]["label"], "Restricted Area");
    assert_eq!(zones[0]["corners"].as_array().unwrap().len(), 4);

    server.shutdown().await;
}

/// Only one session runs; all clients see its updates.
#[tokio::test]
async fn test_single_shared_session() {
    let server = TestServer::start(None).await;
    let mut first = server.connect().await;
    let mut second = server.connect().await;
    expect_type(&mut first, "config").await;
    expect_type(&mut second, "config").await;

    send(&mut first, json!({"command": "start_tracking"})).await;
    let response = expect_type(&mut first, "command_response").await;
    assert_eq!(response["data"]["status"], "tracking_started");

    send(&mut second, json!({"command": "start_tracking"})).await;
    let response = expect_type(&mut second, "command_response").await;
    assert_eq!(response["data"]["status"], "already_running");

    let update = expect_type(&mut second, "live_tracking_update").await;
    assert!(update["data"]["frameNumber"].as_u64().unwrap() >= 1);

    send(&mut first, json!({"command": "get_status"})).await;
    let status = expect_type(&mut first, "status").await;
    assert_eq!(status["data"]["isRunning"], true);
    assert_eq!(status["data"]["connectedClients"], 2);
    assert_eq!(status["data"]["session"]["source"], "mock");

    send(&mut first, json!({"command": "stop_tracking"})).await;
    let response = expect_type(&mut first, "command_response").await;
    assert_eq!(response["data"]["status"], "tracking_stopped");
    let complete = expect_type(&mut second, "tracking_complete").await;
    assert_eq!(complete["data"]["reason"], "cancelled");

    server.shutdown().await;
}

/// A limited mock run completes by itself.
#[tokio::test]
async fn test_session_runs_to_completion() {
    let server = TestServer::start(Some(5)).await;
    let mut client = server.connect().await;
    expect_type(&mut client, "config").await;

    send(&mut client, json!({"command": "start_tracking"})).await;
    expect_type(&mut client, "tracking_started").await;
    let complete = expect_type(&mut client, "tracking_complete").await;
    assert_eq!(complete["data"]["reason"], "exhausted");
    assert_eq!(complete["data"]["totalFrames"], 5);

    server.shutdown().await;
}

/// Zone updates are answered with a report and re-announced to everyone.
#[tokio::test]
async fn test_update_config_broadcasts_overlays() {
    let server = TestServer::start(None).await;
    let mut first = server.connect().await;
    let mut second = server.connect().await;
    expect_type(&mut first, "config").await;
    expect_type(&mut second, "config").await;

    send(
        &mut first,
        json!({
            "command": "update_config",
            "config": {"zones": [
                {"id": "camp", "center": {"lat": -1.29, "lng": 34.76}, "radius": 150},
                {"id": "broken", "center": {"x": 1, "y": 2}}
            ]}
        }),
    )
    .await;
    let response = expect_type(&mut first, "command_response").await;
    assert_eq!(response["data"]["status"], "config_updated");
    assert_eq!(response["data"]["report"]["zones"], json!(["camp"]));
    assert_eq!(
        response["data"]["report"]["rejected"]
            .as_array()
            .unwrap()
            .len(),
        1
    );

    let config = expect_type(&mut second, "config").await;
    let zones = config["data"]["zones"].as_array().unwrap();
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0]["shape"], "circle");

    server.shutdown().await;
}

/// Garbage in, error out; the connection stays usable.
#[tokio::test]
async fn test_invalid_command() {
    let server = TestServer::start(None).await;
    let mut client = server.connect().await;
    expect_type(&mut client, "config").await;

    client
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();
    let error = expect_type(&mut client, "error").await;
    assert!(error["data"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid command"));

    send(&mut client, json!({"command": "force_alert", "entityId": 1, "zoneId": "boundary"}))
        .await;
    let error = expect_type(&mut client, "error").await;
    assert_eq!(error["data"]["message"], "Session is not running");

    send(&mut client, json!({"command": "get_status"})).await;
    let status = expect_type(&mut client, "status").await;
    assert_eq!(status["data"]["isRunning"], false);

    server.shutdown().await;
}
