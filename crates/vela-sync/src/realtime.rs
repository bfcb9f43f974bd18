//! # Realtime Channel
//!
//! WebSocket invalidation channel: the server pushes `entity_updated`
//! notifications and the terminal narrows its next pull to the named type,
//! instead of waiting for the poll timer.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Realtime Connection Lifecycle                         │
//! │                                                                         │
//! │   connect wss://host/ws?register_id=...                                 │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   session: {"type":"ping"} keepalive on a fixed interval,               │
//! │            entity_updated ──▶ pull_one(entity_type)                     │
//! │        │                                                                │
//! │        ▼ (closed / error)                                               │
//! │   backoff: base · 2^attempt, capped ── up to max attempts ──▶ give up   │
//! │                                                               (waits    │
//! │                                                    for an explicit      │
//! │                                                    reconnect trigger)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The channel is an optimization only: a dead channel degrades the terminal
//! to plain polling, it never blocks a domain operation.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use vela_core::EntityType;

use crate::api::RemoteApi;
use crate::config::RealtimeSettings;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::pull::IncrementalPuller;

// =============================================================================
// Wire Messages
// =============================================================================

/// A message pushed by the server over the realtime channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeMessage {
    /// Handshake acknowledgement after connecting.
    Connected,
    /// A reference collection changed server-side.
    EntityUpdated {
        #[serde(rename = "entityType")]
        entity_type: String,
        #[serde(rename = "entityId")]
        entity_id: Option<i64>,
        #[serde(rename = "changeType")]
        change_type: Option<String>,
        timestamp: Option<String>,
    },
    /// Keepalive reply.
    Pong,
    /// Server-side error report; informational.
    Error { message: Option<String> },
}

/// Derives the channel endpoint from the normalized server url.
pub(crate) fn channel_url(server_url: &str, register_id: &str) -> SyncResult<String> {
    let ws_base = if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(SyncError::InvalidConfig(format!(
            "server url '{server_url}' has no http(s) scheme"
        )));
    };
    Ok(format!("{ws_base}/ws?register_id={register_id}"))
}

/// Reconnect backoff: doubles from the base, capped, never elapsing on its
/// own (the attempt counter bounds it instead).
pub(crate) fn reconnect_backoff(settings: &RealtimeSettings) -> ExponentialBackoff {
    let base = settings.backoff_base_secs.max(1);
    let cap = settings.backoff_cap_secs.max(base);
    ExponentialBackoff {
        initial_interval: Duration::from_secs(base),
        max_interval: Duration::from_secs(cap),
        multiplier: 2.0,
        randomization_factor: 0.0,
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

// =============================================================================
// Client
// =============================================================================

enum Command {
    /// Resets the attempt counter and reconnects, also from the gave-up
    /// state.
    Reconnect,
    Shutdown,
}

/// Handle to a spawned realtime client task.
pub struct RealtimeHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl RealtimeHandle {
    /// Forces a reconnect, also after the client gave up.
    pub fn reconnect(&self) {
        let _ = self.tx.send(Command::Reconnect);
    }

    /// Stops the client task.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

/// Reconnecting WebSocket client driving watermark-scoped pulls.
pub struct RealtimeClient<A: RemoteApi> {
    server_url: String,
    register_id: String,
    puller: Arc<IncrementalPuller<A>>,
    events: EventBus,
    settings: RealtimeSettings,
}

impl<A: RemoteApi + 'static> RealtimeClient<A> {
    pub fn new(
        server_url: &str,
        register_id: &str,
        puller: Arc<IncrementalPuller<A>>,
        events: EventBus,
        settings: RealtimeSettings,
    ) -> Self {
        RealtimeClient {
            server_url: server_url.to_string(),
            register_id: register_id.to_string(),
            puller,
            events,
            settings,
        }
    }

    /// Spawns the connection loop and returns its handle.
    pub fn spawn(self) -> RealtimeHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        RealtimeHandle { tx }
    }

    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let url = match channel_url(&self.server_url, &self.register_id) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "realtime channel disabled");
                return;
            }
        };

        let mut attempts: u32 = 0;
        let mut backoff = reconnect_backoff(&self.settings);
        loop {
            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    info!(url = %url, "realtime channel connected");
                    attempts = 0;
                    backoff.reset();
                    self.events.emit(SyncEvent::RealtimeConnected);

                    let shutdown = self.session(stream, &mut commands).await;
                    self.events.emit(SyncEvent::RealtimeDisconnected);
                    if shutdown {
                        return;
                    }
                }
                Err(e) => {
                    debug!(error = %e, attempt = attempts, "realtime connect failed");
                }
            }

            attempts += 1;
            if attempts >= self.settings.max_reconnect_attempts {
                warn!(
                    attempts,
                    "realtime channel gave up, waiting for an explicit reconnect"
                );
                self.events.emit(SyncEvent::RealtimeGaveUp);
                match commands.recv().await {
                    Some(Command::Reconnect) => {
                        attempts = 0;
                        backoff.reset();
                    }
                    Some(Command::Shutdown) | None => return,
                }
                continue;
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or_else(|| Duration::from_secs(self.settings.backoff_cap_secs));
            debug!(delay_secs = delay.as_secs(), "realtime reconnect backoff");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                cmd = commands.recv() => match cmd {
                    Some(Command::Reconnect) => {
                        attempts = 0;
                        backoff.reset();
                    }
                    Some(Command::Shutdown) | None => return,
                },
            }
        }
    }

    /// Runs one connected session until the socket drops.
    ///
    /// Returns `true` when a shutdown command ended the session.
    async fn session<S>(
        &self,
        stream: tokio_tungstenite::WebSocketStream<S>,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> bool
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut sink, mut source) = stream.split();
        let mut keepalive =
            tokio::time::interval(Duration::from_secs(self.settings.ping_interval_secs.max(1)));
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        keepalive.tick().await; // immediate first tick

        loop {
            tokio::select! {
                _ = keepalive.tick() => {
                    // A missing pong is logged on the server side of this
                    // exchange; the session only ends when the send fails
                    if sink.send(Message::Text(r#"{"type":"ping"}"#.into())).await.is_err() {
                        return false;
                    }
                }
                cmd = commands.recv() => match cmd {
                    Some(Command::Reconnect) => return false,
                    Some(Command::Shutdown) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return true;
                    }
                },
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "realtime read failed");
                        return false;
                    }
                },
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        let message: RealtimeMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "unparseable realtime message");
                return;
            }
        };

        match message {
            RealtimeMessage::Connected | RealtimeMessage::Pong => {}
            RealtimeMessage::Error { message } => {
                warn!(message = ?message, "realtime server error");
            }
            RealtimeMessage::EntityUpdated {
                entity_type,
                entity_id,
                change_type,
                ..
            } => {
                debug!(
                    entity_type = %entity_type,
                    entity_id = ?entity_id,
                    change_type = ?change_type,
                    "entity update notification"
                );
                let Some(entity_type) = EntityType::parse(&entity_type) else {
                    warn!(entity_type = %entity_type, "unknown entity type in notification");
                    return;
                };
                if let Err(e) = self.puller.pull_one(entity_type).await {
                    warn!(entity_type = %entity_type, error = %e, "notification pull failed");
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_parsing() {
        let msg: RealtimeMessage = serde_json::from_str(r#"{"type":"connected"}"#).unwrap();
        assert_eq!(msg, RealtimeMessage::Connected);

        let msg: RealtimeMessage = serde_json::from_str(
            r#"{"type":"entity_updated","entityType":"products","entityId":42,
                "changeType":"updated","timestamp":"2026-08-30T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            RealtimeMessage::EntityUpdated {
                entity_type: "products".into(),
                entity_id: Some(42),
                change_type: Some("updated".into()),
                timestamp: Some("2026-08-30T10:00:00Z".into()),
            }
        );

        // Sparse notifications are still valid
        let msg: RealtimeMessage =
            serde_json::from_str(r#"{"type":"entity_updated","entityType":"settings"}"#).unwrap();
        assert!(matches!(msg, RealtimeMessage::EntityUpdated { .. }));
    }

    #[test]
    fn test_channel_url() {
        assert_eq!(
            channel_url("https://pos.example.com", "reg-1").unwrap(),
            "wss://pos.example.com/ws?register_id=reg-1"
        );
        assert_eq!(
            channel_url("http://localhost:3000", "reg-1").unwrap(),
            "ws://localhost:3000/ws?register_id=reg-1"
        );
        assert!(channel_url("ftp://x", "reg-1").is_err());
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let settings = RealtimeSettings {
            ping_interval_secs: 30,
            backoff_base_secs: 1,
            backoff_cap_secs: 60,
            max_reconnect_attempts: 10,
        };
        let mut backoff = reconnect_backoff(&settings);
        let delays: Vec<u64> = (0..8)
            .map(|_| backoff.next_backoff().unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }
}
