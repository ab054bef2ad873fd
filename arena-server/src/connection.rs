//! Per-connection handling. Each accepted WebSocket is split into a send
//! task draining the connection's bounded outbound channel and a receive
//! task feeding the dispatcher; whichever finishes first aborts the other.
//! A slow or stuck client only ever stalls its own pair of tasks.

use crate::codec;
use crate::dispatch;
use crate::state::AppState;
use arena_core::RemovalReason;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Frames queued per connection before the slow client starts losing them.
const OUTBOUND_BUFFER: usize = 64;
/// Upper bound for a single transport write, including the closing frame.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upgrades the HTTP request and hands the socket to [`websocket`].
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| websocket(socket, state))
}

/// Drives one connection from registration to cleanup.
async fn websocket(stream: WebSocket, state: Arc<AppState>) {
    // By splitting, we can send and receive at the same time.
    let (sink, receiver) = stream.split();
    let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let client_id = state.registry.lock().await.add_connection(outbound);
    tracing::info!(client_id, "Client connected.");

    let shutdown = state.shutdown.subscribe();
    let mut send_task = tokio::spawn(send_loop(sink, outbound_rx, shutdown));
    let receive_state = state.clone();
    let receive_client = client_id.clone();
    let mut receive_task =
        tokio::spawn(async move { receive_loop(receiver, receive_state, receive_client).await });

    // If any one of the tasks runs to completion, we abort the other.
    let result = tokio::select! {
        res_a = &mut send_task => {receive_task.abort(); res_a},
        res_b = &mut receive_task => {send_task.abort(); res_b},
    };
    let reason = result.unwrap_or_else(|err| {
        tracing::error!(?err, "Connection task panicked.");
        "internal task failure"
    });

    tracing::info!(client_id, reason, "Client disconnected.");
    cleanup(&state, &client_id).await;
}

/// Writes queued frames to the transport. Every write is time-bounded so a
/// stuck client ends its own connection instead of pinning the task.
async fn send_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Utf8Bytes>,
    mut shutdown: watch::Receiver<bool>,
) -> &'static str {
    if *shutdown.borrow_and_update() {
        return "server shutting down";
    }
    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    return "outbound channel closed";
                };
                match tokio::time::timeout(WRITE_TIMEOUT, sink.send(Message::Text(frame))).await {
                    Err(_) => return "write timed out",
                    Ok(Err(_)) => return "connection lost",
                    Ok(Ok(())) => {}
                }
            }
            _ = shutdown.changed() => {
                let _ = tokio::time::timeout(WRITE_TIMEOUT, sink.send(Message::Close(None))).await;
                return "server shutting down";
            }
        }
    }
}

/// Reads frames from the transport and feeds the dispatcher. Malformed
/// envelopes are logged and dropped; the connection stays open.
async fn receive_loop(
    mut receiver: SplitStream<WebSocket>,
    state: Arc<AppState>,
    client_id: String,
) -> &'static str {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match codec::parse(text.as_str()) {
                Ok(envelope) => dispatch::dispatch(&state, &client_id, envelope).await,
                Err(err) => {
                    tracing::warn!(client_id, %err, "Dropping malformed envelope.");
                }
            },
            Ok(Message::Close(_)) => return "client closed the connection",
            // Transport level ping/pong and binary frames are not part of
            // the protocol.
            Ok(_) => {}
            Err(_) => return "connection lost",
        }
    }
    "connection lost"
}

/// Ends the registry entry and removes the player into the grace buffer.
async fn cleanup(state: &Arc<AppState>, client_id: &str) {
    let now = state.clock.now_ms();
    let player_id = {
        let mut registry = state.registry.lock().await;
        let player_id = registry.remove_connection(client_id);
        if let Some(connection) = registry.connection(client_id) {
            tracing::info!(
                client_id,
                player_name = connection.player_name.as_deref().unwrap_or("-"),
                session_ms = now.saturating_sub(connection.connected_at_ms),
                idle_ms = now.saturating_sub(connection.last_activity_ms),
                "Session ended."
            );
        }
        player_id
    };
    let Some(player_id) = player_id else {
        return;
    };
    let result = state
        .game
        .lock()
        .await
        .remove_player(&player_id, RemovalReason::Disconnect);
    if let Err(err) = result {
        tracing::warn!(client_id, player_id, %err, "Disconnect cleanup found no player.");
    }
}
