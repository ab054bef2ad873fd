//! The error taxonomy of the game core. Every operation on the model is
//! total: invalid input maps to one of these and leaves state unchanged.

use thiserror::Error;

/// What a rejected move collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collision {
    Wall,
    Player,
    Bounds,
}

impl std::fmt::Display for Collision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Collision::Wall => "wall",
            Collision::Player => "player",
            Collision::Bounds => "bounds",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("player {0} already exists")]
    DuplicatePlayer(String),
    #[error("unknown player {0}")]
    UnknownPlayer(String),
    #[error("player {0} is waiting for a spawn point")]
    NotSpawned(String),
    #[error("move components must be -1, 0 or 1 and not both zero")]
    InvalidMove,
    #[error("move blocked by {0}")]
    MoveFailed(Collision),
    #[error("fire direction must have exactly one non-zero component")]
    InvalidDirection,
    #[error("player {0} already has a bullet in flight")]
    BulletInFlight(String),
    #[error("no active or disconnected player {0}")]
    NotFound(String),
}
