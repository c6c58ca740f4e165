//! Event-plane WebSocket endpoints, one per channel.
//!
//! Each connection drains its own outbound queue so one slow socket never
//! blocks the others; the gateway owns registration, fan-out and pruning.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::debug;

use crate::events::domain::Channel;

use super::http::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    client_id: Option<String>,
}

/// Upgrade handler for `/ws/{dashboard,anomalies,training,events}`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(channel) = Channel::parse(&channel) else {
        return (StatusCode::NOT_FOUND, "unknown channel").into_response();
    };
    let Some(client_id) = params.client_id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "client_id is required").into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, channel, client_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, channel: Channel, client_id: String) {
    let (connection_id, mut outbound) = state.gateway.accept(channel, &client_id);
    let (mut sink, mut stream) = socket.split();
    let mut ping = interval(Duration::from_secs(state.gateway.heartbeat_interval_secs().max(1)));
    ping.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                // Queue closed: the gateway dropped this connection.
                None => break,
            },
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    state.gateway.touch(&connection_id);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Client payloads are ignored; the event plane is one-way.
                Some(Ok(_)) => {}
            },
        }
    }

    state.gateway.remove(&connection_id);
    debug!(%connection_id, channel = channel.as_str(), "socket closed");
}
