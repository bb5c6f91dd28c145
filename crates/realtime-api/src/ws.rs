//! The `/realtime/v1/websocket` upgrade endpoint and the per-connection
//! read/write loops that drive `realtime-core`'s `Connection`/`Hub`.
//!
//! Grounded on the split-socket, `tx`/`rx`-pair pattern of
//! `other_examples`' `jtjenkins-Together` websocket handler: the socket
//! is split into a sender half owned by a dedicated write task and a
//! receiver half driven by a dedicated read task, joined with
//! `tokio::select!` so either side tearing down stops the other.

use crate::server::AppState;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use realtime_common::message::ClientEvent;
use realtime_common::{ChannelTopic, Claims, Message, ShutdownReason};
use realtime_core::{Connection, JoinConfig, JoinError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, serde::Deserialize)]
pub struct WsUpgradeParams {
    pub apikey: String,
}

/// `GET /realtime/v1/websocket?apikey=...` — the API key is validated
/// before the upgrade is accepted (spec.md §6).
pub async fn websocket_handler(ws: WebSocketUpgrade, Query(params): Query<WsUpgradeParams>, State(state): State<AppState>) -> Response {
    if !state.api_keys.validate(&params.apikey).await {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let capacity = state.config.channel.outbound_queue_capacity;
    let (connection, mut outbound_rx) = Connection::new(capacity, Claims::anonymous());
    let connection = Arc::new(connection);

    if state.hub.register_connection(connection.clone()).await.is_err() {
        return;
    }

    let write_timeout = state.config.heartbeat.write_timeout();
    let conn_for_write = connection.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            match tokio::time::timeout(write_timeout, ws_sender.send(WsMessage::Text(text))).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    conn_for_write.initiate_shutdown(ShutdownReason::Transport);
                    break;
                }
                Err(_) => {
                    // Write deadline exceeded: spec.md §5 treats this as
                    // a slow-consumer shutdown, not a generic timeout.
                    conn_for_write.initiate_shutdown(ShutdownReason::SlowConsumer);
                    break;
                }
            }
        }
    });

    let heartbeat_timeout = state.config.heartbeat.timeout();
    let conn_for_read = connection.clone();
    let state_for_read = state.clone();
    let mut read_task = tokio::spawn(async move {
        let mut sweep = tokio::time::interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = conn_for_read.cancelled() => break,
                _ = sweep.tick() => {
                    if conn_for_read.is_heartbeat_timed_out(heartbeat_timeout) {
                        conn_for_read.initiate_shutdown(ShutdownReason::HeartbeatTimeout);
                        break;
                    }
                }
                frame = ws_receiver.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            handle_frame(&state_for_read, &conn_for_read, &text).await;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Err(_)) => {
                            conn_for_read.initiate_shutdown(ShutdownReason::Transport);
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    state.hub.unregister_connection(connection.id()).await;
}

async fn handle_frame(state: &AppState, connection: &Arc<Connection>, text: &str) {
    connection.touch_heartbeat();
    connection.record_inbound();

    let Ok(msg) = serde_json::from_str::<Message>(text) else {
        let _ = connection.enqueue(Message::protocol_error("phoenix", None));
        return;
    };

    let Some(event) = ClientEvent::from_str(&msg.event) else {
        let _ = connection.enqueue(Message::protocol_error(msg.topic.clone(), msg.reference.clone()));
        return;
    };

    match event {
        ClientEvent::Heartbeat => {
            let _ = connection.enqueue(Message::reply_ok(&msg, json!({})));
        }
        ClientEvent::PhxJoin => handle_join(state, connection, &msg).await,
        ClientEvent::PhxLeave => handle_leave(state, connection, &msg).await,
        ClientEvent::AccessToken => handle_access_token(state, connection, &msg).await,
        ClientEvent::Broadcast => handle_broadcast(state, connection, &msg).await,
        ClientEvent::Presence => handle_presence(state, connection, &msg).await,
    }
}

async fn handle_join(state: &AppState, connection: &Arc<Connection>, msg: &Message) {
    let topic = ChannelTopic::new(msg.topic.clone());
    let config = match JoinConfig::parse(&msg.payload) {
        Ok(config) => config,
        Err(e) => {
            let _ = connection.enqueue(Message::reply_error(msg, e.to_string()));
            return;
        }
    };

    let claims = match msg.payload.get("access_token").and_then(|v| v.as_str()) {
        Some(token) => match state.tokens.validate(token).await {
            Ok(claims) => claims,
            Err(_) => {
                let _ = connection.enqueue(Message::reply_error(msg, "unauthorized"));
                return;
            }
        },
        None => connection.claims().await,
    };
    connection.set_claims(claims.clone()).await;

    match state.hub.join_channel(connection.clone(), topic.clone(), msg.join_ref.clone(), config, claims).await {
        Ok(outcome) => {
            let _ = connection.enqueue(Message::reply_ok(msg, json!({})));
            let _ = connection.enqueue(Message::push(
                topic.as_str(),
                realtime_common::message::EVENT_SYSTEM,
                json!({
                    "status": "ok",
                    "extension": "postgres_changes",
                    "message": format!("{} postgres_changes filter(s) accepted", outcome.accepted_filters),
                }),
                msg.join_ref.clone(),
            ));
            if let Some(snapshot) = outcome.presence_snapshot {
                let _ = connection.enqueue(Message::push(
                    topic.as_str(),
                    realtime_common::message::EVENT_PRESENCE_STATE,
                    snapshot,
                    msg.join_ref.clone(),
                ));
            }
        }
        Err(JoinError::Unauthorized) => {
            let _ = connection.enqueue(Message::reply_error(msg, "unauthorized"));
        }
        Err(JoinError::ConflictingVisibility(topic)) => {
            let _ = connection.enqueue(Message::reply_error(
                msg,
                format!("channel '{topic}' already exists with a conflicting visibility"),
            ));
        }
    }
}

async fn handle_leave(state: &AppState, connection: &Arc<Connection>, msg: &Message) {
    let topic = ChannelTopic::new(msg.topic.clone());
    state.hub.leave_channel(connection.id(), &topic).await;
    let _ = connection.enqueue(Message::reply_ok(msg, json!({})));
    let _ = connection.enqueue(Message::close(topic.as_str(), msg.join_ref.clone(), "leave"));
}

async fn handle_access_token(state: &AppState, connection: &Arc<Connection>, msg: &Message) {
    let Some(token) = msg.payload.get("access_token").and_then(|v| v.as_str()) else {
        let _ = connection.enqueue(Message::protocol_error(msg.topic.clone(), msg.reference.clone()));
        return;
    };
    match state.tokens.validate(token).await {
        Ok(claims) => {
            connection.set_claims(claims.clone()).await;
            let topic = ChannelTopic::new(msg.topic.clone());
            state.hub.refresh_claims(connection.id(), &topic, claims).await;
        }
        Err(_) => {
            let _ = connection.enqueue(Message::reply_error(msg, "invalid access token"));
        }
    }
}

async fn handle_broadcast(state: &AppState, connection: &Arc<Connection>, msg: &Message) {
    let topic = ChannelTopic::new(msg.topic.clone());
    let Some(channel) = state.hub.channel(&topic).await else {
        let _ = connection.enqueue(Message::reply_error(msg, "not joined"));
        return;
    };
    let event = msg.payload.get("event").and_then(|v| v.as_str()).unwrap_or("broadcast");
    let payload = msg.payload.get("payload").cloned().unwrap_or_else(|| json!({}));
    if channel.broadcast(connection.id(), event, payload) {
        let _ = connection.enqueue(Message::reply_ok(msg, json!({})));
    }
}

async fn handle_presence(state: &AppState, connection: &Arc<Connection>, msg: &Message) {
    let topic = ChannelTopic::new(msg.topic.clone());
    let Some(channel) = state.hub.channel(&topic).await else {
        return;
    };
    let Some(key) = channel.presence_key_of(connection.id()) else {
        return;
    };
    match msg.payload.get("event").and_then(|v| v.as_str()) {
        Some("untrack") => channel.untrack_presence(connection.id(), &key),
        _ => {
            let payload = msg.payload.get("payload").cloned().unwrap_or_else(|| json!({}));
            channel.track_presence(connection.id(), &key, payload);
        }
    }
}
