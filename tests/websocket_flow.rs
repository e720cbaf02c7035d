use std::net::TcpListener;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use futures::stream::{SplitSink, SplitStream, Stream};
use futures::{SinkExt, StreamExt};
use notify_server::websocket::notifications_route;
use notify_server::{AppState, Envelope, Settings};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind an ephemeral port, spawn the server, and hand back the shared state
/// plus the upgrade URL.
fn spawn_server() -> (web::Data<AppState>, String) {
    let config = Settings::new_for_test().expect("Failed to load test config");
    let state = web::Data::new(AppState::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind ephemeral port");
    let addr = listener.local_addr().unwrap();

    let server_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(server_state.clone())
            .route("/ws/notifications", web::get().to(notifications_route))
    })
    .listen(listener)
    .expect("Failed to listen")
    .workers(1)
    .run();

    tokio::spawn(server);

    (state, format!("ws://{}/ws/notifications", addr))
}

/// Next JSON text frame, skipping protocol ping/pong.
async fn next_json<S>(read: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, read.next())
            .await
            .expect("Timed out waiting for frame")
            .expect("Stream ended unexpectedly")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Invalid JSON frame")
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected frame: {:?}", other),
        }
    }
}

async fn assert_silent<S>(read: &mut S)
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let result = tokio::time::timeout(POLL_INTERVAL * 3, async {
        loop {
            match read.next().await {
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                other => return other,
            }
        }
    })
    .await;
    assert!(result.is_err(), "Expected no frame, got {:?}", result);
}

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connect a client and consume its `connected` handshake frame.
async fn connect_client(server_url: &str) -> (WsWrite, WsRead, String) {
    let url = Url::parse(server_url).expect("Invalid server URL");
    let (ws_stream, _) = connect_async(url.as_str()).await.expect("Failed to connect");
    let (write, mut read) = ws_stream.split();

    let connected = next_json(&mut read).await;
    assert_eq!(connected["type"], "connected");
    let connection_id = connected["connectionId"]
        .as_str()
        .expect("connected frame carries the connection id")
        .to_string();

    (write, read, connection_id)
}

#[actix_web::test]
async fn test_subscribe_and_topic_fanout() {
    let (state, server_url) = spawn_server();

    let (mut write_a, mut read_a, id_a) = connect_client(&server_url).await;
    let (_write_b, mut read_b, id_b) = connect_client(&server_url).await;
    assert_ne!(id_a, id_b);
    assert_eq!(state.notifier.stats().await.clients, 2);

    // A subscribes to "jobs", B does not
    write_a
        .send(Message::Text(
            json!({"action": "subscribe", "topic": "jobs"}).to_string(),
        ))
        .await
        .unwrap();
    let reply = next_json(&mut read_a).await;
    assert_eq!(reply["type"], "subscribed");
    assert_eq!(reply["topic"], "jobs");

    let envelope = Envelope::new("new_job").with("job_id", 42);
    let delivered = state.notifier.send_to_topic("jobs", &envelope).await.unwrap();
    assert_eq!(delivered, 1);

    // Only A receives it
    let frame = next_json(&mut read_a).await;
    assert_eq!(frame["type"], "new_job");
    assert_eq!(frame["job_id"], 42);
    assert_silent(&mut read_b).await;
}

#[actix_web::test]
async fn test_identify_and_user_delivery() {
    let (state, server_url) = spawn_server();

    let (mut write_a, mut read_a, _) = connect_client(&server_url).await;
    let (mut write_b, mut read_b, _) = connect_client(&server_url).await;

    // Both sessions identify as the same user
    for write in [&mut write_a, &mut write_b] {
        write
            .send(Message::Text(
                json!({"action": "identify", "userId": "u1"}).to_string(),
            ))
            .await
            .unwrap();
    }
    let reply = next_json(&mut read_a).await;
    assert_eq!(reply["type"], "identified");
    assert_eq!(reply["userId"], "u1");
    let reply = next_json(&mut read_b).await;
    assert_eq!(reply["type"], "identified");

    let delivered = state
        .notifier
        .send_to_user("u1", &Envelope::new("ping"))
        .await
        .unwrap();
    assert_eq!(delivered, 2);

    assert_eq!(next_json(&mut read_a).await["type"], "ping");
    assert_eq!(next_json(&mut read_b).await["type"], "ping");
}

#[actix_web::test]
async fn test_broadcast_and_disconnect_cleanup() {
    let (state, server_url) = spawn_server();

    let (mut write_a, mut read_a, _) = connect_client(&server_url).await;
    let (_write_b, mut read_b, _) = connect_client(&server_url).await;
    let (_write_c, mut read_c, _) = connect_client(&server_url).await;
    assert_eq!(state.notifier.stats().await.clients, 3);

    let delivered = state.notifier.broadcast(&Envelope::new("alert")).await.unwrap();
    assert_eq!(delivered, 3);
    for read in [&mut read_a, &mut read_b, &mut read_c] {
        assert_eq!(next_json(read).await["type"], "alert");
    }

    // A subscribes, then disconnects; its registrations must be purged
    write_a
        .send(Message::Text(
            json!({"action": "subscribe", "topic": "jobs"}).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(next_json(&mut read_a).await["type"], "subscribed");
    write_a.send(Message::Close(None)).await.unwrap();

    // Wait for the server to settle the disconnect
    for _ in 0..20 {
        if state.notifier.stats().await.clients == 2 {
            break;
        }
        sleep(POLL_INTERVAL).await;
    }
    let stats = state.notifier.stats().await;
    assert_eq!(stats.clients, 2);
    assert_eq!(stats.topics, 0);

    // The topic A was sole subscriber of now delivers to nobody
    let delivered = state
        .notifier
        .send_to_topic("jobs", &Envelope::new("new_job"))
        .await
        .unwrap();
    assert_eq!(delivered, 0);
}

#[actix_web::test]
async fn test_invalid_control_frame_reports_error() {
    let (_state, server_url) = spawn_server();

    let (mut write, mut read, _) = connect_client(&server_url).await;

    write
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();
    let reply = next_json(&mut read).await;
    assert_eq!(reply["type"], "error");

    // The connection stays usable afterwards
    write
        .send(Message::Text(json!({"action": "ping"}).to_string()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut read).await["type"], "pong");
}
