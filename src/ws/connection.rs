use super::close_codes;
use super::reconnect::{reconnect_delay, should_reconnect};
use super::url::{build_ws_url, default_anonymous_style, generate_player_id, generate_room_id};
use crate::game::{StateStore, VersionClient};
use crate::live::LiveHub;
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Close code used when the socket dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub origin: String,
    pub auto_reconnect: bool,
    pub max_retries: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub anonymous_style: Option<Value>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            origin: "https://magicgarden.gg".to_string(),
            auto_reconnect: true,
            max_retries: 999,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(8000),
            anonymous_style: Some(default_anonymous_style()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    pub connecting: bool,
    pub retry_count: u32,
    pub origin: String,
    pub url: Option<String>,
    pub version: Option<String>,
    pub room_id: String,
    pub player_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Open(ConnectionStatus),
    /// `version` is the build the closed socket was connected with.
    Close { code: u16, reason: String, version: Option<String> },
    Reconnect { attempt: u32, delay: Duration, close_code: u16 },
    Error(String),
}

async fn stop_requested(mut rx: watch::Receiver<bool>) {
    // a dropped sender also ends the wait
    let _ = rx.wait_for(|s| *s).await;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Spectator connection to one game room. Text frames other than the `ping`
/// heartbeat go to the [`LiveHub`]; lifecycle changes are broadcast as
/// [`ConnectionEvent`]s.
pub struct GameConnection {
    options: ConnectionOptions,
    versions: VersionClient,
    store: StateStore,
    hub: Arc<LiveHub>,
    status: Mutex<ConnectionStatus>,
    events: broadcast::Sender<ConnectionEvent>,
    stop: watch::Sender<bool>,
}

impl GameConnection {
    pub fn new(options: ConnectionOptions, versions: VersionClient, store: StateStore, hub: Arc<LiveHub>) -> Self {
        let status = ConnectionStatus {
            origin: options.origin.clone(),
            room_id: generate_room_id(),
            player_id: generate_player_id(),
            ..Default::default()
        };
        let (events, _) = broadcast::channel(64);
        let (stop, _) = watch::channel(false);
        Self { options, versions, store, hub, status: Mutex::new(status), events, stop }
    }

    pub fn status(&self) -> ConnectionStatus {
        lock(&self.status).clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ConnectionEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    fn stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Closes the socket with 1000 and ends [`run`](Self::run) without reconnecting.
    pub fn stop(&self) {
        self.stop.send_replace(true);
        tracing::info!("WebSocket stopped");
    }

    /// Connects and keeps reconnecting until stopped, a no-reconnect close code
    /// arrives or the retry budget runs out.
    pub async fn run(&self) {
        self.stop.send_replace(false);
        loop {
            let code = match self.connect_once().await {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!("WebSocket connection error: {:#}", e);
                    self.emit(ConnectionEvent::Error(format!("{:#}", e)));
                    ABNORMAL_CLOSURE
                }
            };
            {
                let mut status = lock(&self.status);
                status.connected = false;
                status.connecting = false;
            }

            if !should_reconnect(self.options.auto_reconnect, self.stopped(), code) {
                tracing::info!(code, "Not reconnecting ({})", close_codes::message(code));
                return;
            }

            let attempt = {
                let mut status = lock(&self.status);
                if status.retry_count >= self.options.max_retries {
                    tracing::warn!(max_retries = self.options.max_retries, "Max reconnect attempts reached");
                    return;
                }
                status.retry_count += 1;
                status.retry_count
            };
            let delay = reconnect_delay(attempt, self.options.min_delay, self.options.max_delay);
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, close_code = code, "Scheduling reconnect");
            self.emit(ConnectionEvent::Reconnect { attempt, delay, close_code: code });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_requested(self.stop.subscribe()) => return,
            }
        }
    }

    /// One connection lifetime. Returns the close code.
    async fn connect_once(&self) -> Result<u16> {
        lock(&self.status).connecting = true;

        let version = self.versions.current().await.context("fetching game version")?;
        if let Err(e) = self.store.save_version(&version).await {
            tracing::warn!("Failed to save game version: {:#}", e);
        }

        let url = {
            let mut status = lock(&self.status);
            let url = build_ws_url(
                &self.options.origin,
                &version,
                &status.room_id,
                &status.player_id,
                self.options.anonymous_style.as_ref(),
            );
            status.version = Some(version);
            status.url = Some(url.clone());
            url
        };

        tracing::info!(url = %url, "Connecting to WebSocket");
        let (socket, _response) = connect_async(url.as_str()).await.context("websocket handshake")?;

        let status = {
            let mut status = lock(&self.status);
            status.retry_count = 0;
            status.connected = true;
            status.connecting = false;
            status.clone()
        };
        tracing::info!(room_id = %status.room_id, version = ?status.version, "WebSocket connected");
        self.emit(ConnectionEvent::Open(status));

        let (mut write, mut read) = socket.split();
        let stop = stop_requested(self.stop.subscribe());
        tokio::pin!(stop);

        let (code, reason) = loop {
            tokio::select! {
                next = read.next() => {
                    let text = match next {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                        Some(Ok(Message::Close(frame))) => {
                            break match frame {
                                Some(f) => (u16::from(f.code), f.reason.into_owned()),
                                None => (u16::from(CloseCode::Status), String::new()),
                            };
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            tracing::warn!("WebSocket read error: {}", e);
                            break (ABNORMAL_CLOSURE, e.to_string());
                        }
                        None => break (ABNORMAL_CLOSURE, String::new()),
                    };

                    if text == "ping" {
                        if let Err(e) = write.send(Message::Text("pong".to_string())).await {
                            tracing::warn!("Failed to answer heartbeat: {}", e);
                        }
                        continue;
                    }
                    self.hub.handle_raw(&text);
                }
                _ = &mut stop => {
                    let frame = CloseFrame { code: CloseCode::Normal, reason: "Client stop".into() };
                    // the peer may already be gone
                    let _ = write.send(Message::Close(Some(frame))).await;
                    break (1000, "Client stop".to_string());
                }
            }
        };

        tracing::info!(code, reason = %reason, "WebSocket closed");
        let version = lock(&self.status).version.clone();
        self.emit(ConnectionEvent::Close { code, reason, version });
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> GameConnection {
        let client = reqwest::Client::new();
        GameConnection::new(
            ConnectionOptions::default(),
            VersionClient::new(client, "http://127.0.0.1:9"),
            StateStore::new(std::env::temp_dir()),
            Arc::new(LiveHub::new()),
        )
    }

    #[test]
    fn fresh_connection_has_ids_but_no_url() {
        let conn = connection();
        let status = conn.status();
        assert!(!status.connected);
        assert!(status.player_id.starts_with("p_"));
        assert_eq!(status.room_id.len(), 8);
        assert!(status.url.is_none());
    }

    #[tokio::test]
    async fn run_returns_once_stopped_during_backoff() {
        let conn = Arc::new(connection());
        let mut events = conn.subscribe();
        let runner = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.run().await })
        };

        // the version fetch fails against a closed port, then a reconnect is scheduled
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Reconnect { attempt, .. }) => {
                    assert_eq!(attempt, 1);
                    break;
                }
                Ok(_) => continue,
                Err(e) => panic!("event stream ended: {}", e),
            }
        }
        conn.stop();
        tokio::time::timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
    }
}
