use super::close_codes;
use super::connection::{ConnectionEvent, GameConnection};
use crate::atlas::{SpriteSync, SyncOutcome};
use crate::sprites::SpriteIndex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Grace period between a version-change sync and the process exit.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Drives sprite syncs off connection lifecycle events.
#[derive(Clone)]
pub struct SpriteSyncListener {
    sync: Arc<SpriteSync>,
    index: Arc<SpriteIndex>,
}

impl SpriteSyncListener {
    pub fn new(sync: Arc<SpriteSync>, index: Arc<SpriteIndex>) -> Self {
        Self { sync, index }
    }

    /// Subscribes to `connection` and handles its events until the
    /// connection is dropped.
    pub fn spawn(self, connection: &GameConnection) -> JoinHandle<()> {
        let mut events = connection.subscribe();
        tracing::info!("Sprite sync listener registered, watching for version changes");
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.on_event(event),
                    Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "Sprite sync listener lagged"),
                    Err(RecvError::Closed) => return,
                }
            }
        })
    }

    fn on_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Open(_) => {
                tracing::debug!("WebSocket open, triggering sprite check");
                let this = self.clone();
                tokio::spawn(async move {
                    let outcome = this.sync.check_on_connect().await;
                    this.after_sync(outcome.as_ref());
                });
            }
            ConnectionEvent::Close { code, reason, .. } if close_codes::is_version_change(code) => {
                tracing::warn!(code, reason = %reason, "{}, triggering sprite sync", close_codes::message(code));
                let this = self.clone();
                tokio::spawn(async move {
                    if this.sync.handle_version_mismatch().await {
                        this.index.clear();
                        tracing::info!("Sprite sync completed, restarting in {:?}", RESTART_DELAY);
                        tokio::time::sleep(RESTART_DELAY).await;
                        std::process::exit(0);
                    }
                });
            }
            ConnectionEvent::Close { code, reason, version } => {
                tracing::debug!(code, reason = %reason, "WebSocket closed, checking game version");
                let this = self.clone();
                tokio::spawn(async move {
                    let outcome = this.sync.check_after_disconnect(version.as_deref()).await;
                    this.after_sync(outcome.as_ref());
                });
            }
            ConnectionEvent::Reconnect { .. } | ConnectionEvent::Error(_) => {}
        }
    }

    fn after_sync(&self, outcome: Option<&SyncOutcome>) {
        if outcome.is_some_and(SyncOutcome::is_success) {
            self.index.clear();
        }
    }
}
