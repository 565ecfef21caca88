use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::api::SharedState;
use super::auth::AuthUser;
use super::models::*;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── Event types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StudioEvent {
    WebsiteChanged { website: Website },
    WebsiteDeleted { website_id: i64 },
    PageChanged { page: PageSummary },
    PageDeleted { website_id: i64, page_id: i64 },
    SectionChanged { section: Section },
    SectionDeleted { page_id: i64, section_id: i64 },
    ElementChanged { element: Element },
    ElementDeleted { section_id: i64, element_id: i64 },
    MediaChanged { media_id: i64, deleted: bool },
    VCardChanged { vcard_id: i64, deleted: bool },
}

/// A serialized event tagged with the user whose data changed.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub owner_id: i64,
    pub payload: String,
}

pub type EventSender = broadcast::Sender<EventEnvelope>;

/// Serialize and broadcast an event. Returns silently when no client is connected.
pub fn publish(tx: &EventSender, owner_id: i64, event: &StudioEvent) {
    match serde_json::to_string(event) {
        Ok(payload) => {
            let _ = tx.send(EventEnvelope { owner_id, payload });
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize studio event");
        }
    }
}

// ── WebSocket handler ────────────────────────────────────────────────

/// Authentication runs before the upgrade check so bad tokens get a 401.
pub async fn ws_handler(
    user: AuthUser,
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let rx = state.events.subscribe();
    let user_id = user.id;
    tracing::debug!(user_id, "websocket connected");
    ws.on_upgrade(move |socket| {
        let (sender, receiver) = socket.split();
        run_socket_loop(sender, receiver, rx, user_id)
    })
}

/// Forward the user's events, answer keepalives, and exit when the peer
/// stops responding to pings within [`PONG_TIMEOUT`].
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<EventEnvelope>,
    user_id: i64,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // First tick is immediate.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::debug!(user_id, "websocket pong timeout");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(envelope) if envelope.owner_id == user_id => {
                        if sender.send(Message::Text(envelope.payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(user_id, skipped, "websocket client lagged");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    tracing::debug!(user_id, "websocket closed");
}
