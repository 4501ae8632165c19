//! WebSocket handler for real-time violation streaming
//!
//! ## Protocol
//!
//! ### Client → Server
//! ```json
//! {"type": "subscribe", "group_id": "grp-1"}
//! {"type": "unsubscribe", "group_id": "grp-1"}
//! {"type": "ping"}
//! ```
//!
//! ### Server → Client
//! ```json
//! {"type": "subscribed", "group_id": "grp-1"}
//! {"type": "violation_detected", "group_id": "grp-1", ...}
//! {"type": "heartbeat", "timestamp": "..."}
//! ```

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::SharedState;
use crate::models::ViolationEvent;

/// Heartbeat cadence for idle connections
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Messages from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { group_id: String },
    Unsubscribe { group_id: String },
    Ping,
}

/// Messages from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed {
        group_id: String,
    },
    Unsubscribed {
        group_id: String,
    },
    ViolationDetected {
        #[serde(flatten)]
        event: ViolationEvent,
    },
    Heartbeat {
        timestamp: String,
    },
}

/// GET /ws
pub async fn ws_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: SharedState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    // One event channel per connection; its sender is registered under every
    // group the client subscribes to
    let (subscriber_id, event_tx, mut event_rx) = state.hub.register();

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick fires immediately; skip it

    info!(subscriber = subscriber_id, "WebSocket client connected");

    loop {
        tokio::select! {
            // Client messages
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { group_id }) => {
                                state.hub.subscribe(&group_id, subscriber_id, event_tx.clone()).await;
                                debug!(subscriber = subscriber_id, group_id = %group_id, "Client subscribed");
                                let ack = ServerMessage::Subscribed { group_id };
                                if send_json(&mut ws_sink, &ack).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ClientMessage::Unsubscribe { group_id }) => {
                                state.hub.unsubscribe(&group_id, subscriber_id).await;
                                debug!(subscriber = subscriber_id, group_id = %group_id, "Client unsubscribed");
                                let ack = ServerMessage::Unsubscribed { group_id };
                                if send_json(&mut ws_sink, &ack).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ClientMessage::Ping) => {
                                let beat = ServerMessage::Heartbeat {
                                    timestamp: chrono::Utc::now().to_rfc3339(),
                                };
                                if send_json(&mut ws_sink, &beat).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, text = %text, "Failed to parse client message");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if ws_sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and pong frames are ignored
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }

            // Violation events from the hub
            event = event_rx.recv() => {
                match event {
                    Some(event) => {
                        let msg = ServerMessage::ViolationDetected { event };
                        if let Err(e) = send_json(&mut ws_sink, &msg).await {
                            warn!(error = %e, "Failed to push violation event");
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Periodic heartbeat
            _ = heartbeat.tick() => {
                let beat = ServerMessage::Heartbeat {
                    timestamp: chrono::Utc::now().to_rfc3339(),
                };
                if send_json(&mut ws_sink, &beat).await.is_err() {
                    break;
                }
            }
        }
    }

    state.hub.drop_subscriber(subscriber_id).await;
    info!(subscriber = subscriber_id, "WebSocket client disconnected");
}

async fn send_json<S>(sink: &mut S, msg: &ServerMessage) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(msg).unwrap_or_default();
    sink.send(Message::Text(json)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "subscribe", "group_id": "g-1"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { group_id } if group_id == "g-1"));

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "shout"}"#).is_err());
    }

    #[test]
    fn violation_event_is_flattened_and_tagged() {
        let msg = ServerMessage::ViolationDetected {
            event: ViolationEvent {
                violation_id: "v1".to_string(),
                group_id: "g1".to_string(),
                group_name: "Test".to_string(),
                member_id: "m1".to_string(),
                member_name: "Alice".to_string(),
                rule_id: "r1".to_string(),
                rule_label: "no swearing".to_string(),
                source_post_id: Some("p1".to_string()),
                source_post_text: Some("oh dang".to_string()),
                detail: "Banned terms found: dang".to_string(),
                penalty: 0.002,
                detected_at: 1_700_000_000_000,
            },
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"violation_detected\""));
        assert!(json.contains("\"group_id\":\"g1\""));
        assert!(json.contains("dang"));
    }
}
