//! The authoritative game core: board, spawn policy, event bus and the
//! mutable world model. This crate owns every game rule and every mutable
//! game entity; the server binary drives it but never mutates state itself.

pub mod board;
pub mod clock;
pub mod entities;
pub mod errors;
pub mod events;
pub mod model;
pub mod spawn;

pub use board::{Board, BoardError, Cell, Point};
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{Collision, GameError};
pub use events::{EventBus, EventEnvelope, EventScope, EventSink, GameEvent};
pub use model::{GameModel, GameRules, Kill, RemovalReason, SpawnOutcome};
