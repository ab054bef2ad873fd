//! The message vocabulary shared between the game server and terminal clients.
//! Contains the wire envelope, the message type and error code identifiers and
//! the payload structures including the broadcast snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// Message types. The same identifiers are used in both directions.

/// Join request (client -> server) and join acknowledgement (server -> client).
pub const CONNECT: &str = "CONNECT";
/// A one-cell move request (client -> server).
pub const MOVE: &str = "MOVE";
/// A bullet fire request (client -> server).
pub const FIRE: &str = "FIRE";
/// Liveness probe (client -> server).
pub const PING: &str = "PING";
/// Liveness reply (server -> client).
pub const PONG: &str = "PONG";
/// The periodic full snapshot broadcast (server -> client).
pub const STATE_UPDATE: &str = "STATE_UPDATE";
/// A rejected request (server -> client, unicast).
pub const ERROR: &str = "ERROR";

// Error codes carried in [`ErrorNotice`]. The taxonomy is open, these are the
// codes the server emits today.

/// The connection has no player bound to it yet.
pub const NOT_CONNECTED: &str = "NOT_CONNECTED";
/// The move delta was not a one-cell step.
pub const INVALID_MOVE: &str = "INVALID_MOVE";
/// The move was a legal request but the target cell is blocked.
pub const MOVE_FAILED: &str = "MOVE_FAILED";
/// The fire direction was not axis-aligned.
pub const INVALID_DIRECTION: &str = "INVALID_DIRECTION";
/// The player already has a live bullet.
pub const BULLET_IN_FLIGHT: &str = "BULLET_IN_FLIGHT";
/// The player is still waiting for a spawn point.
pub const NOT_SPAWNED: &str = "NOT_SPAWNED";
/// The envelope type is not part of the protocol.
pub const UNKNOWN_TYPE: &str = "UNKNOWN_TYPE";

/// The wire envelope. Every frame in either direction is one of these,
/// serialized as a JSON text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// The message type, one of the identifiers above.
    #[serde(rename = "type")]
    pub kind: String,
    /// The type specific payload, always a JSON object.
    pub payload: Value,
    /// Wall clock milliseconds at which the envelope was created.
    pub timestamp: u64,
    /// The sending client, filled in by the server on unicast responses.
    #[serde(rename = "clientId", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// The payload of a client `CONNECT` request. Both fields are optional: a
/// fresh client sends neither, a reconnecting client claims its prior id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// The display name the player wants to use.
    #[serde(default)]
    pub player_name: Option<String>,
    /// A previously assigned player id, for the reconnect path.
    #[serde(default)]
    pub player_id: Option<String>,
}

/// The payload of the server's `CONNECT` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    /// The transport binding assigned to this connection.
    pub client_id: String,
    /// The player the connection now controls.
    pub player_id: String,
    /// The display name in effect.
    pub player_name: String,
    /// A fresh snapshot so the client can render immediately.
    pub game_state: GameState,
}

/// The payload of a `MOVE` request. Each component must be -1, 0 or 1 and
/// they must not both be zero; diagonals are allowed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MoveCommand {
    pub dx: i32,
    pub dy: i32,
}

/// The payload of a `FIRE` request. Exactly one component must be non-zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FireCommand {
    pub dx: i32,
    pub dy: i32,
}

/// The payload of an `ERROR` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorNotice {
    /// One of the error code identifiers above.
    pub code: String,
    /// A human readable explanation.
    pub message: String,
}

/// The complete, self-contained world snapshot used as the broadcast payload
/// and embedded in the join acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub board: BoardView,
    /// All known players, sorted by player id. Waiting players carry null
    /// coordinates.
    pub players: Vec<PlayerView>,
    pub bullets: Vec<BulletView>,
    /// Current score per player id.
    pub scores: BTreeMap<String, u32>,
    /// False once the server has begun shutting down.
    pub running: bool,
}

/// The board as the client renders it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardView {
    pub width: i32,
    pub height: i32,
    /// Row-major cell codes: 0 empty, 1 wall, 2 spawn point.
    pub grid: Vec<Vec<u8>>,
}

/// One player inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub player_id: String,
    pub player_name: String,
    /// Null while the player waits for a spawn point.
    pub x: Option<i32>,
    /// Null while the player waits for a spawn point.
    pub y: Option<i32>,
    /// Horizontal velocity in cells per second, derived from the last move.
    pub vx: f64,
    /// Vertical velocity in cells per second, derived from the last move.
    pub vy: f64,
}

/// One live bullet inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletView {
    pub bullet_id: String,
    /// The owning player.
    pub player_id: String,
    pub x: i32,
    pub y: i32,
    pub dx: i32,
    pub dy: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_uses_wire_field_names() {
        let envelope = Envelope {
            kind: MOVE.to_string(),
            payload: json!({ "dx": 1, "dy": 0 }),
            timestamp: 1_700_000_000_000,
            client_id: None,
        };
        let text = serde_json::to_string(&envelope).unwrap();
        assert!(text.contains("\"type\":\"MOVE\""));
        assert!(text.contains("\"timestamp\":1700000000000"));
        // Absent client ids must not appear on the wire at all.
        assert!(!text.contains("clientId"));
    }

    #[test]
    fn envelope_round_trips_with_client_id() {
        let text = r#"{"type":"PING","payload":{},"timestamp":42,"clientId":"c-1"}"#;
        let envelope: Envelope = serde_json::from_str(text).unwrap();
        assert_eq!(envelope.kind, PING);
        assert_eq!(envelope.client_id.as_deref(), Some("c-1"));
        let back = serde_json::to_string(&envelope).unwrap();
        assert!(back.contains("\"clientId\":\"c-1\""));
    }

    #[test]
    fn join_request_fields_are_optional() {
        let request: JoinRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.player_name.is_none());
        assert!(request.player_id.is_none());

        let request: JoinRequest =
            serde_json::from_value(json!({ "playerName": "ada", "playerId": "p-7" })).unwrap();
        assert_eq!(request.player_name.as_deref(), Some("ada"));
        assert_eq!(request.player_id.as_deref(), Some("p-7"));
    }

    #[test]
    fn waiting_player_serializes_null_coordinates() {
        let view = PlayerView {
            player_id: "p-1".to_string(),
            player_name: "ada".to_string(),
            x: None,
            y: None,
            vx: 0.0,
            vy: 0.0,
        };
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["x"], Value::Null);
        assert_eq!(value["y"], Value::Null);
        assert_eq!(value["playerId"], "p-1");
    }
}
