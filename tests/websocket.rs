use futures::{SinkExt, StreamExt};
use mg_api::config::AppConfig;
use mg_api::game::{StateStore, VersionClient};
use mg_api::live::LiveHub;
use mg_api::ws::close_codes::{self, AUTHENTICATION_FAILURE, VERSION_EXPIRED, VERSION_MISMATCH};
use mg_api::ws::{reconnect_delay, should_reconnect, ConnectionEvent, ConnectionOptions, GameConnection};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

const WELCOME: &str = r#"{"type":"Welcome","fullState":{"child":{"data":{"weather":"Rain","shops":{}}}}}"#;

fn local_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[test]
fn test_close_code_policy() {
    assert!(!should_reconnect(true, false, AUTHENTICATION_FAILURE));
    assert!(!should_reconnect(true, false, VERSION_EXPIRED));
    assert!(should_reconnect(true, false, VERSION_MISMATCH));
    assert!(!should_reconnect(false, false, 1006));
    assert!(!should_reconnect(true, true, 1006));

    assert!(close_codes::is_version_change(VERSION_MISMATCH));
    assert!(!close_codes::is_version_change(AUTHENTICATION_FAILURE));
    assert_eq!(close_codes::message(4999), "Unknown close code: 4999");
}

#[test]
fn test_backoff_stays_within_jitter_bounds() {
    let min = Duration::from_millis(500);
    let max = Duration::from_millis(8000);
    for _ in 0..50 {
        let first = reconnect_delay(1, min, max).as_millis();
        assert!((400..=600).contains(&first), "{}", first);
        let third = reconnect_delay(3, min, max).as_millis();
        assert!((1600..=2400).contains(&third), "{}", third);
        let capped = reconnect_delay(40, min, max).as_millis();
        assert!((6400..=9600).contains(&capped), "{}", capped);
    }
}

#[test]
fn test_config_feeds_connection_options() {
    let mut config = AppConfig::default();
    config.game.origin = "http://localhost:4000".into();
    config.websocket.max_retries = 3;
    config.websocket.min_delay_ms = 100;
    let options = config.connection_options();
    assert_eq!(options.origin, "http://localhost:4000");
    assert_eq!(options.max_retries, 3);
    assert_eq!(options.min_delay, Duration::from_millis(100));
    assert!(options.anonymous_style.is_some());
}

/// Serves the version endpoint over plain HTTP and rooms over WebSocket on
/// one port. Each room session pings, relays `WELCOME` and closes with 4800.
async fn fake_game(listener: TcpListener, pongs: mpsc::UnboundedSender<String>, paths: Arc<Mutex<Vec<String>>>) {
    while let Ok((stream, _)) = listener.accept().await {
        let pongs = pongs.clone();
        let paths = paths.clone();
        tokio::spawn(async move {
            if is_version_request(&stream).await {
                answer_version(stream).await;
            } else {
                room_session(stream, pongs, paths).await;
            }
        });
    }
}

async fn is_version_request(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 256];
    loop {
        let n = stream.peek(&mut buf).await.unwrap_or(0);
        if n == 0 || buf[..n].windows(2).any(|w| w == b"\r\n") {
            return String::from_utf8_lossy(&buf[..n]).contains("/platform/v1/version");
        }
        tokio::task::yield_now().await;
    }
}

async fn answer_version(mut stream: TcpStream) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&chunk[..n]),
        }
    }
    let body = r#"{"version":"abc"}"#;
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn room_session(stream: TcpStream, pongs: mpsc::UnboundedSender<String>, paths: Arc<Mutex<Vec<String>>>) {
    let record = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        paths.lock().unwrap().push(req.uri().to_string());
        Ok(resp)
    };
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, record).await else {
        return;
    };

    ws.send(Message::Text("ping".into())).await.unwrap();
    if let Some(Ok(Message::Text(reply))) = ws.next().await {
        let _ = pongs.send(reply);
    }
    ws.send(Message::Text(WELCOME.into())).await.unwrap();
    let frame = CloseFrame { code: CloseCode::from(AUTHENTICATION_FAILURE), reason: "bye".into() };
    ws.send(Message::Close(Some(frame))).await.unwrap();
    while let Some(Ok(_)) = ws.next().await {}
}

#[tokio::test]
async fn test_room_session_relays_state_and_honours_close_code() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = format!("http://{}", listener.local_addr().unwrap());
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel();
    let paths = Arc::new(Mutex::new(Vec::new()));
    tokio::spawn(fake_game(listener, pong_tx, paths.clone()));

    let data_dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(data_dir.path());
    let hub = Arc::new(LiveHub::new());
    let options = ConnectionOptions { origin: origin.clone(), ..Default::default() };
    let conn = GameConnection::new(options, VersionClient::new(local_client(), &origin), store.clone(), hub.clone());
    let mut events = conn.subscribe();

    tokio::time::timeout(Duration::from_secs(10), conn.run()).await.expect("run should end on 4800");

    assert_eq!(pong_rx.recv().await.as_deref(), Some("pong"));
    assert_eq!(hub.weather().as_deref(), Some("Rain"));
    assert_eq!(store.load_version().await.unwrap().as_deref(), Some("abc"));

    let path = paths.lock().unwrap()[0].clone();
    assert!(path.starts_with("/version/abc/api/rooms/"), "{}", path);
    assert!(path.contains("playerId=%22p_"), "{}", path);

    let ConnectionEvent::Open(status) = events.recv().await.unwrap() else {
        panic!("expected open first");
    };
    assert!(status.connected);
    assert_eq!(status.version.as_deref(), Some("abc"));
    assert_eq!(
        events.recv().await.unwrap(),
        ConnectionEvent::Close { code: AUTHENTICATION_FAILURE, reason: "bye".into(), version: Some("abc".into()) }
    );
    assert!(!conn.status().connected);
}

#[tokio::test]
async fn test_retry_budget_ends_the_loop() {
    // a port that was just released refuses connections
    let port = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap().port();
    let origin = format!("http://127.0.0.1:{}", port);
    let data_dir = tempfile::tempdir().unwrap();
    let options = ConnectionOptions { origin: origin.clone(), max_retries: 0, ..Default::default() };
    let conn = GameConnection::new(
        options,
        VersionClient::new(local_client(), &origin),
        StateStore::new(data_dir.path()),
        Arc::new(LiveHub::new()),
    );
    let mut events = conn.subscribe();

    tokio::time::timeout(Duration::from_secs(10), conn.run()).await.expect("no retries allowed");

    assert!(matches!(events.recv().await.unwrap(), ConnectionEvent::Error(_)));
    assert!(events.try_recv().is_err());
}
