//! The two periodic drivers: the simulation tick advancing bullets,
//! respawns and purges, and the broadcast tick fanning the snapshot out to
//! every active connection. Both stop on the shutdown signal.

use crate::codec;
use crate::state::AppState;
use axum::extract::ws::Utf8Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub fn spawn_tickers(state: &Arc<AppState>) -> (JoinHandle<()>, JoinHandle<()>) {
    let simulation = tokio::spawn(simulation_loop(
        state.clone(),
        state.shutdown.subscribe(),
    ));
    let broadcast = tokio::spawn(broadcast_loop(
        state.clone(),
        state.shutdown.subscribe(),
    ));
    (simulation, broadcast)
}

/// Advances the world at a fixed cadence. Kills only emit events here; the
/// resulting state travels with the next broadcast.
async fn simulation_loop(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_millis(state.config.tick_interval_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                {
                    let mut game = state.game.lock().await;
                    for kill in game.tick_bullets() {
                        tracing::info!(
                            killer_id = kill.killer_id,
                            victim_id = kill.victim_id,
                            "Player killed."
                        );
                    }
                    game.process_respawns();
                    game.try_spawn_waiting_players();
                    game.purge_expired_disconnected();
                }
                state
                    .registry
                    .lock()
                    .await
                    .purge_ended(state.config.disconnect_grace_ms);
            }
            _ = shutdown.changed() => return,
        }
    }
}

/// Serializes the snapshot once per tick and sends the shared frame to
/// every active connection. Nothing is serialized while nobody listens.
async fn broadcast_loop(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut interval =
        tokio::time::interval(Duration::from_millis(state.config.broadcast_interval_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let recipients = state.registry.lock().await.active_senders();
                if recipients.is_empty() {
                    continue;
                }
                let snapshot = state.game.lock().await.serialize_snapshot();
                let payload = match serde_json::to_value(&snapshot) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::error!(%err, "Failed to serialize snapshot.");
                        continue;
                    }
                };
                let envelope =
                    codec::create(protocol::STATE_UPDATE, payload, None, state.clock.now_ms());
                let text = match serde_json::to_string(&envelope) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::error!(%err, "Failed to serialize broadcast envelope.");
                        continue;
                    }
                };
                let frame = Utf8Bytes::from(text);
                for (client_id, sender) in recipients {
                    // A full channel means the client fell behind; missing a
                    // self-contained snapshot is tolerable.
                    if sender.try_send(frame.clone()).is_err() {
                        tracing::warn!(client_id, "Dropping snapshot for slow client.");
                    }
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}
