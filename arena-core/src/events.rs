//! In-process publish/subscribe for game events. The bus delivers
//! synchronously in the emitting call and never filters by scope; listeners
//! receive the full envelope and filter themselves. Listeners must not
//! subscribe or emit from inside a delivery, the bus holds its listener
//! lock while dispatching.

use crate::board::Point;
use crate::clock::Clock;
use crate::errors::Collision;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

/// Who an event is addressed to. The selector travels with the envelope so
/// listeners can filter; the bus itself delivers to every listener of the
/// event's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventScope {
    /// Every listener is meant.
    Global,
    /// Listeners filtering on the named group are meant.
    Group(String),
    /// A single addressee, usually a player id.
    Targeted(String),
}

/// The events the core emits. The taxonomy is open: `Custom` carries any
/// event type the core does not know about.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// A move was rejected by a wall, another player or the board edge.
    Bump {
        player_id: String,
        attempted: Point,
        current: Point,
        collision: Collision,
    },
    /// A player reached the board for the first time.
    PlayerJoined {
        player_id: String,
        player_name: String,
    },
    /// A player left the game, including disconnects into the grace buffer.
    PlayerLeft { player_id: String },
    /// A player was placed at a spawn point.
    Spawn {
        player_id: String,
        position: Point,
        spawn_index: usize,
    },
    /// A player's score changed.
    ScoreChange { player_id: String, score: u32 },
    /// The server's running flag flipped.
    GameStateChange { running: bool },
    /// An event type unknown to the core, delivered verbatim.
    Custom {
        name: String,
        data: serde_json::Value,
    },
}

impl GameEvent {
    /// The event type listeners subscribe under.
    pub fn name(&self) -> &str {
        match self {
            GameEvent::Bump { .. } => "bump",
            GameEvent::PlayerJoined { .. } => "playerJoined",
            GameEvent::PlayerLeft { .. } => "playerLeft",
            GameEvent::Spawn { .. } => "spawn",
            GameEvent::ScoreChange { .. } => "scoreChange",
            GameEvent::GameStateChange { .. } => "gameStateChange",
            GameEvent::Custom { name, .. } => name,
        }
    }
}

/// The full delivery: event, scope and emission time. Never sent over the
/// wire.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub event: GameEvent,
    pub scope: EventScope,
    pub timestamp: u64,
}

/// The seam the model publishes through. Test doubles capture emissions by
/// implementing this instead of replacing the model.
pub trait EventSink: Send + Sync {
    fn emit(&self, scope: EventScope, event: GameEvent);
}

type Listener = Box<dyn Fn(&EventEnvelope) + Send + Sync>;

/// The in-process bus. Listeners register per event type; delivery is
/// synchronous and a panicking listener never aborts dispatch of the rest.
pub struct EventBus {
    clock: Arc<dyn Clock>,
    listeners: Mutex<HashMap<String, Vec<Listener>>>,
}

impl EventBus {
    pub fn new(clock: Arc<dyn Clock>) -> EventBus {
        EventBus {
            clock,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a listener for one event type.
    pub fn subscribe<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock().expect("listener table poisoned");
        listeners
            .entry(event_type.to_string())
            .or_default()
            .push(Box::new(listener));
    }
}

impl EventSink for EventBus {
    fn emit(&self, scope: EventScope, event: GameEvent) {
        let envelope = EventEnvelope {
            timestamp: self.clock.now_ms(),
            scope,
            event,
        };
        let listeners = self.listeners.lock().expect("listener table poisoned");
        let Some(registered) = listeners.get(envelope.event.name()) else {
            return;
        };
        for listener in registered {
            if catch_unwind(AssertUnwindSafe(|| listener(&envelope))).is_err() {
                tracing::error!(event = envelope.event.name(), "Event listener panicked.");
            }
        }
    }
}
