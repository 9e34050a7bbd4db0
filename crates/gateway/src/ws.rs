//! WebSocket endpoint: session-authenticated upgrade and the per-connection
//! loop.
//!
//! Each connection gets one read loop (this function) and one writer task
//! draining the bounded outbound channel, so replies stay ordered relative
//! to the requests that produced them. A keepalive ticker multiplexes into
//! the read loop; a peer that stops answering pings past the pong deadline
//! is disconnected. Connection-level failures terminate only this
//! connection.

use crate::api::{client_ip, extract_token, user_agent};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::protocol::Reply;
use crate::registry::{ConnectionHandle, ConnectionRegistry, OUTBOUND_CHANNEL_SIZE};
use crate::service::Services;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use session::SessionManager;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

/// Shared application state.
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub services: Arc<Services>,
    pub sessions: SessionManager,
    pub dispatcher: Dispatcher,
    pub config: Config,
}

/// WebSocket upgrade handler. The session is validated before the upgrade
/// completes; a bad token never reaches the socket loop.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(token) = extract_token(&headers, &params) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let ip = client_ip(&headers);
    let agent = user_agent(&headers);
    match state.sessions.validate(&token, &ip, &agent).await {
        Ok(client_id) => ws.on_upgrade(move |socket| handle_socket(socket, state, client_id)),
        Err(err) => {
            warn!("rejected websocket upgrade: {}", err);
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

/// Run one connection to completion.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, client_id: Uuid) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_CHANNEL_SIZE);

    let handle = Arc::new(ConnectionHandle::new(client_id, tx));
    let connection_id = state.registry.register(handle.clone());

    counter!("gateway_connections_total").increment(1);
    gauge!("gateway_active_connections").set(state.registry.count() as f64);
    info!("client {} connected as {}", client_id, connection_id);

    // Writer task: the only place frames go out, preserving reply order.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut ping_interval = interval(state.config.ping_interval);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let pong_deadline_ms = state.config.pong_timeout.as_millis() as i64;

    loop {
        tokio::select! {
            biased;

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = state.dispatcher.dispatch(client_id, &text).await;
                        if send_reply(&handle, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let Ok(text) = std::str::from_utf8(&data) else {
                            warn!("connection {} sent non-UTF-8 frame", connection_id);
                            break;
                        };
                        let reply = state.dispatcher.dispatch(client_id, text).await;
                        if send_reply(&handle, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        handle.touch();
                        if handle.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        handle.touch();
                    }
                    Some(Ok(Message::Close(_))) => {
                        break;
                    }
                    Some(Err(err)) => {
                        warn!("connection {} read error: {}", connection_id, err);
                        break;
                    }
                    None => {
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if handle.idle_ms() > pong_deadline_ms {
                    warn!("connection {} missed pong deadline", connection_id);
                    break;
                }
                if handle.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.registry.unregister(&connection_id);
    send_task.abort();

    counter!("gateway_disconnections_total").increment(1);
    gauge!("gateway_active_connections").set(state.registry.count() as f64);
    info!("client {} disconnected ({})", client_id, connection_id);
}

async fn send_reply(handle: &ConnectionHandle, reply: &Reply) -> Result<()> {
    let json = serde_json::to_string(reply)?;
    handle.send(Message::Text(json.into())).await
}
