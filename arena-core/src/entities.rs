//! The mutable game entities. All of them are exclusively owned by the
//! model and reference each other by id, never by pointer.

use crate::board::Point;

/// One connected (or waiting) player avatar.
#[derive(Debug, Clone)]
pub struct Player {
    pub player_id: String,
    pub player_name: String,
    /// The transport binding currently controlling this player.
    pub client_id: String,
    /// Which spawn point the player occupies, if any.
    pub spawn_index: Option<usize>,
    position: Option<Point>,
    /// True once the player has been placed for the first time.
    pub has_spawned: bool,
    // Velocity bookkeeping: the position before the last move and when the
    // move happened. Only used to derive vx/vy at serialization time.
    previous: Option<Point>,
    moved_at_ms: Option<u64>,
}

impl Player {
    pub fn new(client_id: String, player_id: String, player_name: String) -> Player {
        Player {
            player_id,
            player_name,
            client_id,
            spawn_index: None,
            position: None,
            has_spawned: false,
            previous: None,
            moved_at_ms: None,
        }
    }

    /// Both coordinates or neither: `None` means waiting for a spawn point.
    pub fn position(&self) -> Option<Point> {
        self.position
    }

    /// Places the player at a spawn point. Velocity bookkeeping resets, a
    /// spawn is not a move.
    pub fn place_at(&mut self, point: Point, spawn_index: usize) {
        self.position = Some(point);
        self.spawn_index = Some(spawn_index);
        self.has_spawned = true;
        self.previous = None;
        self.moved_at_ms = None;
    }

    /// Restores a position verbatim, used by the reconnect path.
    pub fn restore_at(&mut self, point: Point, spawn_index: Option<usize>) {
        self.position = Some(point);
        self.spawn_index = spawn_index;
        self.has_spawned = true;
        self.previous = None;
        self.moved_at_ms = None;
    }

    /// Applies an accepted move and records the bookkeeping the snapshot
    /// velocity is derived from.
    pub fn move_to(&mut self, point: Point, now_ms: u64) {
        self.previous = self.position;
        self.moved_at_ms = Some(now_ms);
        self.position = Some(point);
    }

    /// Back to the waiting state, forgetting spawn point and velocity.
    pub fn clear_position(&mut self) {
        self.position = None;
        self.spawn_index = None;
        self.previous = None;
        self.moved_at_ms = None;
    }

    /// Cells per second since the last applied move, zero when there is no
    /// bookkeeping or no elapsed time.
    pub fn velocity(&self, now_ms: u64) -> (f64, f64) {
        let (Some(position), Some(previous), Some(moved_at)) =
            (self.position, self.previous, self.moved_at_ms)
        else {
            return (0.0, 0.0);
        };
        let elapsed_seconds = now_ms.saturating_sub(moved_at) as f64 / 1000.0;
        if elapsed_seconds == 0.0 {
            return (0.0, 0.0);
        }
        (
            (position.x - previous.x) as f64 / elapsed_seconds,
            (position.y - previous.y) as f64 / elapsed_seconds,
        )
    }
}

/// A live projectile. At most one per owning player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bullet {
    pub bullet_id: String,
    /// The owning player, by id.
    pub player_id: String,
    pub x: i32,
    pub y: i32,
    pub dx: i32,
    pub dy: i32,
}

/// What the grace buffer keeps of a disconnected player.
#[derive(Debug, Clone)]
pub struct DisconnectedRecord {
    pub player_name: String,
    pub position: Option<Point>,
    pub spawn_index: Option<usize>,
    pub score: u32,
    pub disconnected_at_ms: u64,
}

/// A pending respawn: the earliest wall clock at which the attempt may run.
#[derive(Debug, Clone)]
pub struct RespawnTask {
    pub player_id: String,
    pub respawn_at_ms: u64,
}
