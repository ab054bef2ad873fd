//! Routing of inbound envelopes. Every envelope first refreshes the
//! connection's activity stamp, then gets handled by type. Game-rule
//! rejections are answered with unicast `ERROR` envelopes; the next
//! broadcast conveys every successful outcome, so success needs no reply.

use crate::codec;
use crate::state::AppState;
use arena_core::GameError;
use axum::extract::ws::Utf8Bytes;
use protocol::{Envelope, ErrorNotice, FireCommand, JoinRequest, JoinResponse, MoveCommand};
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

pub async fn dispatch(state: &Arc<AppState>, client_id: &str, envelope: Envelope) {
    state.registry.lock().await.touch(client_id);

    match envelope.kind.as_str() {
        protocol::CONNECT => handle_connect(state, client_id, envelope.payload).await,
        protocol::MOVE => handle_move(state, client_id, envelope.payload).await,
        protocol::FIRE => handle_fire(state, client_id, envelope.payload).await,
        protocol::PING => send(state, client_id, protocol::PONG, json!({})).await,
        other => {
            tracing::warn!(client_id, message_type = other, "Unknown message type, dropping.");
        }
    }
}

/// Join or reconnect. A claimed prior player id is tried against the
/// active set and the grace buffer first; a fresh player is allocated
/// otherwise.
async fn handle_connect(state: &Arc<AppState>, client_id: &str, payload: Value) {
    let request: JoinRequest = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(client_id, %err, "Dropping malformed CONNECT payload.");
            return;
        }
    };

    // A repeated CONNECT on the same transport keeps its binding.
    if let Some(existing) = state.registry.lock().await.player_id(client_id) {
        let game = state.game.lock().await;
        let player_name = game
            .player(&existing)
            .map(|player| player.player_name.clone())
            .unwrap_or_default();
        let snapshot = game.serialize_snapshot();
        drop(game);
        respond_connected(state, client_id, &existing, &player_name, snapshot).await;
        return;
    }

    if let Some(prior_id) = request.player_id.as_deref() {
        let mut game = state.game.lock().await;
        match game.restore_player(prior_id, client_id) {
            Ok(position) => {
                let player_name = game
                    .player(prior_id)
                    .map(|player| player.player_name.clone())
                    .unwrap_or_default();
                let snapshot = game.serialize_snapshot();
                drop(game);
                tracing::info!(client_id, player_id = prior_id, ?position, "Player restored.");
                state
                    .registry
                    .lock()
                    .await
                    .set_player(client_id, prior_id, &player_name);
                respond_connected(state, client_id, prior_id, &player_name, snapshot).await;
                return;
            }
            // No trace of the claimed id: fall through to a fresh join.
            Err(GameError::NotFound(_)) => drop(game),
            Err(err) => {
                drop(game);
                tracing::error!(client_id, player_id = prior_id, %err, "Restore failed.");
                return;
            }
        }
    }

    let player_id = Uuid::new_v4().to_string();
    let player_name = request
        .player_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| format!("player-{}", &player_id[..8]));

    let mut game = state.game.lock().await;
    if let Err(err) = game.add_player(client_id, &player_id, &player_name) {
        drop(game);
        tracing::error!(client_id, player_id, %err, "Failed to add player.");
        return;
    }
    match game.spawn_player(&player_id) {
        Ok(outcome) => tracing::info!(client_id, player_id, ?outcome, "Player joined."),
        Err(err) => tracing::error!(client_id, player_id, %err, "Spawn failed."),
    }
    let snapshot = game.serialize_snapshot();
    drop(game);

    state
        .registry
        .lock()
        .await
        .set_player(client_id, &player_id, &player_name);
    respond_connected(state, client_id, &player_id, &player_name, snapshot).await;
}

async fn respond_connected(
    state: &Arc<AppState>,
    client_id: &str,
    player_id: &str,
    player_name: &str,
    snapshot: protocol::GameState,
) {
    let response = JoinResponse {
        client_id: client_id.to_string(),
        player_id: player_id.to_string(),
        player_name: player_name.to_string(),
        game_state: snapshot,
    };
    match serde_json::to_value(&response) {
        Ok(payload) => send(state, client_id, protocol::CONNECT, payload).await,
        Err(err) => tracing::error!(client_id, %err, "Failed to serialize join response."),
    }
}

async fn handle_move(state: &Arc<AppState>, client_id: &str, payload: Value) {
    let Some(player_id) = state.registry.lock().await.player_id(client_id) else {
        send_error(state, client_id, protocol::NOT_CONNECTED, "join the game first").await;
        return;
    };
    let command: MoveCommand = match serde_json::from_value(payload) {
        Ok(command) => command,
        Err(_) => {
            send_error(state, client_id, protocol::INVALID_MOVE, "malformed move payload").await;
            return;
        }
    };

    let result = state
        .game
        .lock()
        .await
        .move_player(&player_id, command.dx, command.dy);
    if let Err(err) = result {
        let code = match err {
            GameError::InvalidMove => protocol::INVALID_MOVE,
            GameError::NotSpawned(_) => protocol::NOT_SPAWNED,
            GameError::MoveFailed(_) => protocol::MOVE_FAILED,
            GameError::UnknownPlayer(_) => protocol::NOT_CONNECTED,
            _ => {
                tracing::error!(client_id, player_id, %err, "Unexpected move failure.");
                return;
            }
        };
        send_error(state, client_id, code, &err.to_string()).await;
    }
}

async fn handle_fire(state: &Arc<AppState>, client_id: &str, payload: Value) {
    let Some(player_id) = state.registry.lock().await.player_id(client_id) else {
        send_error(state, client_id, protocol::NOT_CONNECTED, "join the game first").await;
        return;
    };
    let command: FireCommand = match serde_json::from_value(payload) {
        Ok(command) => command,
        Err(_) => {
            send_error(
                state,
                client_id,
                protocol::INVALID_DIRECTION,
                "malformed fire payload",
            )
            .await;
            return;
        }
    };

    let result = state
        .game
        .lock()
        .await
        .fire_bullet(&player_id, command.dx, command.dy);
    if let Err(err) = result {
        let code = match err {
            GameError::InvalidDirection => protocol::INVALID_DIRECTION,
            GameError::BulletInFlight(_) => protocol::BULLET_IN_FLIGHT,
            GameError::NotSpawned(_) => protocol::NOT_SPAWNED,
            GameError::UnknownPlayer(_) => protocol::NOT_CONNECTED,
            _ => {
                tracing::error!(client_id, player_id, %err, "Unexpected fire failure.");
                return;
            }
        };
        send_error(state, client_id, code, &err.to_string()).await;
    }
}

async fn send_error(state: &Arc<AppState>, client_id: &str, code: &str, message: &str) {
    let notice = ErrorNotice {
        code: code.to_string(),
        message: message.to_string(),
    };
    match serde_json::to_value(&notice) {
        Ok(payload) => send(state, client_id, protocol::ERROR, payload).await,
        Err(err) => tracing::error!(client_id, %err, "Failed to serialize error notice."),
    }
}

/// Unicasts one envelope to a connection. A full outbound channel drops
/// the frame, a slow client never blocks the caller.
async fn send(state: &Arc<AppState>, client_id: &str, kind: &str, payload: Value) {
    let envelope = codec::create(
        kind,
        payload,
        Some(client_id.to_string()),
        state.clock.now_ms(),
    );
    let text = match serde_json::to_string(&envelope) {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(client_id, %err, "Failed to serialize envelope.");
            return;
        }
    };
    let sender = state.registry.lock().await.sender(client_id);
    let Some(sender) = sender else {
        return;
    };
    if sender.try_send(Utf8Bytes::from(text)).is_err() {
        tracing::warn!(client_id, kind, "Outbound channel full, dropping frame.");
    }
}
