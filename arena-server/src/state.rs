//! The shared application state: the game model and the connection
//! registry behind their own locks, plus the shutdown signal. The two
//! locks are never held at the same time.

use crate::config::ServerConfig;
use crate::registry::ConnectionRegistry;
use arena_core::{Clock, GameModel};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

pub struct AppState {
    pub config: ServerConfig,
    pub clock: Arc<dyn Clock>,
    /// The single shared mutable of the game; all mutations and snapshot
    /// reads go through this lock.
    pub game: Mutex<GameModel>,
    /// Independently locked; broadcast snapshots the sender list under a
    /// short lock and writes outside it.
    pub registry: Mutex<ConnectionRegistry>,
    /// Flipped to true exactly once, on SIGINT/SIGTERM.
    pub shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(config: ServerConfig, clock: Arc<dyn Clock>, game: GameModel) -> AppState {
        let (shutdown, _) = watch::channel(false);
        AppState {
            registry: Mutex::new(ConnectionRegistry::new(clock.clone())),
            config,
            clock,
            game: Mutex::new(game),
            shutdown,
        }
    }
}
