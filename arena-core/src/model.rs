//! The authoritative world model. This is the only place that mutates
//! players, bullets and scores; the server drives it under a single lock so
//! every operation is atomic and totally ordered.

use crate::board::{Board, Point};
use crate::clock::Clock;
use crate::entities::{Bullet, DisconnectedRecord, Player, RespawnTask};
use crate::errors::{Collision, GameError};
use crate::events::{EventScope, EventSink, GameEvent};
use crate::spawn;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// The tunable rules the model runs under.
#[derive(Debug, Clone)]
pub struct GameRules {
    /// Earliest respawn after a kill.
    pub respawn_delay_ms: u64,
    /// How long a disconnected player's record is kept for reconnects.
    /// Zero disables the grace buffer.
    pub disconnect_grace_ms: u64,
    /// Manhattan clearance a spawn point needs from every live player.
    pub spawn_clear_radius: i32,
}

impl Default for GameRules {
    fn default() -> Self {
        GameRules {
            respawn_delay_ms: 2_000,
            disconnect_grace_ms: 60_000,
            spawn_clear_radius: 3,
        }
    }
}

/// The result of a spawn attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// The player was placed at this point.
    Spawned(Point),
    /// No spawn point is currently clear; the player joined the waiting
    /// queue.
    Waiting,
}

/// One kill of a simulation tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kill {
    pub killer_id: String,
    pub victim_id: String,
}

/// Why a player is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The transport dropped; the player may come back within grace.
    Disconnect,
    /// The player left for good.
    Leave,
}

/// The authoritative in-memory world.
pub struct GameModel {
    board: Arc<Board>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    rules: GameRules,
    players: BTreeMap<String, Player>,
    bullets: BTreeMap<String, Bullet>,
    scores: BTreeMap<String, u32>,
    disconnected: BTreeMap<String, DisconnectedRecord>,
    respawn_queue: VecDeque<RespawnTask>,
    /// Players without a spawn point, in the order they started waiting.
    waiting: VecDeque<String>,
    running: bool,
}

impl GameModel {
    pub fn new(
        board: Arc<Board>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        rules: GameRules,
    ) -> GameModel {
        GameModel {
            board,
            clock,
            events,
            rules,
            players: BTreeMap::new(),
            bullets: BTreeMap::new(),
            scores: BTreeMap::new(),
            disconnected: BTreeMap::new(),
            respawn_queue: VecDeque::new(),
            waiting: VecDeque::new(),
            running: true,
        }
    }

    /// Inserts a new player in the waiting state with a zero score.
    pub fn add_player(
        &mut self,
        client_id: &str,
        player_id: &str,
        player_name: &str,
    ) -> Result<(), GameError> {
        if self.players.contains_key(player_id) {
            return Err(GameError::DuplicatePlayer(player_id.to_string()));
        }
        self.players.insert(
            player_id.to_string(),
            Player::new(
                client_id.to_string(),
                player_id.to_string(),
                player_name.to_string(),
            ),
        );
        self.scores.insert(player_id.to_string(), 0);
        Ok(())
    }

    /// Tries to place the player at the first clear spawn point. A player
    /// that is already on the board keeps its position.
    pub fn spawn_player(&mut self, player_id: &str) -> Result<SpawnOutcome, GameError> {
        let player = self
            .players
            .get(player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
        if let Some(position) = player.position() {
            return Ok(SpawnOutcome::Spawned(position));
        }

        if let Some(point) = self.try_place(player_id) {
            return Ok(SpawnOutcome::Spawned(point));
        }
        if !self.waiting.contains(&player_id.to_string()) {
            self.waiting.push_back(player_id.to_string());
        }
        Ok(SpawnOutcome::Waiting)
    }

    /// Applies a one-cell move. Rejections emit a targeted `bump` and leave
    /// the world untouched.
    pub fn move_player(&mut self, player_id: &str, dx: i32, dy: i32) -> Result<(), GameError> {
        if dx.abs() > 1 || dy.abs() > 1 || (dx == 0 && dy == 0) {
            return Err(GameError::InvalidMove);
        }
        let player = self
            .players
            .get(player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
        let current = player
            .position()
            .ok_or_else(|| GameError::NotSpawned(player_id.to_string()))?;

        let target = Point::new(current.x + dx, current.y + dy);
        let collision = if !self.board.in_bounds(target.x, target.y) {
            Some(Collision::Bounds)
        } else if self.board.is_wall(target.x, target.y) {
            Some(Collision::Wall)
        } else if self.occupant_id(target).is_some() {
            Some(Collision::Player)
        } else {
            None
        };

        if let Some(collision) = collision {
            self.events.emit(
                EventScope::Targeted(player_id.to_string()),
                GameEvent::Bump {
                    player_id: player_id.to_string(),
                    attempted: target,
                    current,
                    collision,
                },
            );
            return Err(GameError::MoveFailed(collision));
        }

        let now = self.clock.now_ms();
        self.players
            .get_mut(player_id)
            .expect("player checked above")
            .move_to(target, now);
        Ok(())
    }

    /// Spawns a bullet at the owner's cell. One live bullet per player.
    pub fn fire_bullet(&mut self, player_id: &str, dx: i32, dy: i32) -> Result<Bullet, GameError> {
        let axis_aligned = (dx == 0) != (dy == 0);
        if !axis_aligned || dx.abs() > 1 || dy.abs() > 1 {
            return Err(GameError::InvalidDirection);
        }
        let player = self
            .players
            .get(player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
        let position = player
            .position()
            .ok_or_else(|| GameError::NotSpawned(player_id.to_string()))?;
        if self.bullets.values().any(|bullet| bullet.player_id == player_id) {
            return Err(GameError::BulletInFlight(player_id.to_string()));
        }

        let bullet = Bullet {
            bullet_id: Uuid::new_v4().to_string(),
            player_id: player_id.to_string(),
            x: position.x,
            y: position.y,
            dx,
            dy,
        };
        self.bullets.insert(bullet.bullet_id.clone(), bullet.clone());
        Ok(bullet)
    }

    /// Advances every bullet one cell and resolves hits. Returns the kills
    /// of this tick.
    pub fn tick_bullets(&mut self) -> Vec<Kill> {
        let mut kills = Vec::new();
        let bullet_ids: Vec<String> = self.bullets.keys().cloned().collect();
        for bullet_id in bullet_ids {
            let Some(bullet) = self.bullets.get(&bullet_id) else {
                continue;
            };
            let owner_id = bullet.player_id.clone();
            let target = Point::new(bullet.x + bullet.dx, bullet.y + bullet.dy);

            if !self.board.in_bounds(target.x, target.y) || self.board.is_wall(target.x, target.y)
            {
                self.bullets.remove(&bullet_id);
                continue;
            }

            match self.occupant_id(target) {
                Some(victim_id) if victim_id != owner_id => {
                    self.bullets.remove(&bullet_id);
                    self.kill(&victim_id, &owner_id);
                    kills.push(Kill {
                        killer_id: owner_id,
                        victim_id,
                    });
                }
                Some(_) => {
                    // The owner walked into its own bullet: the bullet dies,
                    // the owner is unharmed.
                    self.bullets.remove(&bullet_id);
                }
                None => {
                    let bullet = self.bullets.get_mut(&bullet_id).expect("bullet present");
                    bullet.x = target.x;
                    bullet.y = target.y;
                }
            }
        }
        kills
    }

    /// Takes the victim off the board, schedules its respawn and credits
    /// the killer.
    pub fn kill(&mut self, victim_id: &str, killer_id: &str) {
        let Some(victim) = self.players.get_mut(victim_id) else {
            return;
        };
        victim.clear_position();
        self.respawn_queue.push_back(RespawnTask {
            player_id: victim_id.to_string(),
            respawn_at_ms: self.clock.now_ms() + self.rules.respawn_delay_ms,
        });

        let score = self
            .scores
            .entry(killer_id.to_string())
            .and_modify(|score| *score += 1)
            .or_insert(1);
        let score = *score;
        tracing::debug!(victim_id, killer_id, score, "Player killed.");
        self.events.emit(
            EventScope::Targeted(killer_id.to_string()),
            GameEvent::ScoreChange {
                player_id: killer_id.to_string(),
                score,
            },
        );
    }

    /// Attempts every due respawn task. Tasks that find no clear spawn
    /// point stay queued for the next tick.
    pub fn process_respawns(&mut self) -> Vec<String> {
        let now = self.clock.now_ms();
        let mut respawned = Vec::new();
        let mut remaining = VecDeque::new();
        while let Some(task) = self.respawn_queue.pop_front() {
            if task.respawn_at_ms > now {
                remaining.push_back(task);
                continue;
            }
            // The player may have disconnected while dead.
            if !self.players.contains_key(&task.player_id) {
                continue;
            }
            match self.try_place(&task.player_id) {
                Some(_) => respawned.push(task.player_id),
                None => remaining.push_back(task),
            }
        }
        self.respawn_queue = remaining;
        respawned
    }

    /// Attempts a placement for every waiting player, in the order they
    /// entered the waiting state.
    pub fn try_spawn_waiting_players(&mut self) -> Vec<String> {
        let mut placed = Vec::new();
        let mut still_waiting = VecDeque::new();
        while let Some(player_id) = self.waiting.pop_front() {
            let Some(player) = self.players.get(&player_id) else {
                continue;
            };
            if player.position().is_some() {
                continue;
            }
            match self.try_place(&player_id) {
                Some(_) => placed.push(player_id),
                None => still_waiting.push_back(player_id),
            }
        }
        self.waiting = still_waiting;
        placed
    }

    /// Removes a player. Disconnects go to the grace buffer (when grace is
    /// enabled), leaves purge immediately. The player's bullets die with it.
    pub fn remove_player(&mut self, player_id: &str, reason: RemovalReason) -> Result<(), GameError> {
        let player = self
            .players
            .remove(player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
        self.bullets.retain(|_, bullet| bullet.player_id != player_id);
        let score = self.scores.remove(player_id).unwrap_or(0);
        self.waiting.retain(|waiting_id| waiting_id != player_id);
        self.respawn_queue.retain(|task| task.player_id != player_id);

        if reason == RemovalReason::Disconnect && self.rules.disconnect_grace_ms > 0 {
            self.disconnected.insert(
                player_id.to_string(),
                DisconnectedRecord {
                    player_name: player.player_name.clone(),
                    position: player.position(),
                    spawn_index: player.spawn_index,
                    score,
                    disconnected_at_ms: self.clock.now_ms(),
                },
            );
        }

        self.events.emit(
            EventScope::Global,
            GameEvent::PlayerLeft {
                player_id: player_id.to_string(),
            },
        );
        Ok(())
    }

    /// Rebinds an active player to a new transport, or revives a
    /// grace-buffer record with position, score and spawn index. A revived
    /// player whose recorded cell is meanwhile occupied re-enters the
    /// waiting queue.
    pub fn restore_player(
        &mut self,
        player_id: &str,
        new_client_id: &str,
    ) -> Result<Option<Point>, GameError> {
        if let Some(player) = self.players.get_mut(player_id) {
            player.client_id = new_client_id.to_string();
            return Ok(player.position());
        }

        let record = self
            .disconnected
            .remove(player_id)
            .ok_or_else(|| GameError::NotFound(player_id.to_string()))?;

        let mut player = Player::new(
            new_client_id.to_string(),
            player_id.to_string(),
            record.player_name,
        );
        let restored = match record.position {
            Some(point) if self.occupant_id(point).is_none() => {
                player.restore_at(point, record.spawn_index);
                Some(point)
            }
            _ => None,
        };
        self.players.insert(player_id.to_string(), player);
        self.scores.insert(player_id.to_string(), record.score);
        if restored.is_none() {
            self.waiting.push_back(player_id.to_string());
        }
        Ok(restored)
    }

    /// Drops grace-buffer records whose grace period has elapsed.
    pub fn purge_expired_disconnected(&mut self) -> usize {
        let now = self.clock.now_ms();
        let grace = self.rules.disconnect_grace_ms;
        let before = self.disconnected.len();
        self.disconnected
            .retain(|_, record| now.saturating_sub(record.disconnected_at_ms) < grace);
        let purged = before - self.disconnected.len();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired disconnected players.");
        }
        purged
    }

    /// Builds the broadcast snapshot. Velocities are derived here from the
    /// last applied move; waiting players serialize with null coordinates.
    pub fn serialize_snapshot(&self) -> protocol::GameState {
        let now = self.clock.now_ms();
        protocol::GameState {
            board: self.board.view(),
            players: self
                .players
                .values()
                .map(|player| {
                    let (vx, vy) = player.velocity(now);
                    protocol::PlayerView {
                        player_id: player.player_id.clone(),
                        player_name: player.player_name.clone(),
                        x: player.position().map(|point| point.x),
                        y: player.position().map(|point| point.y),
                        vx,
                        vy,
                    }
                })
                .collect(),
            bullets: self
                .bullets
                .values()
                .map(|bullet| protocol::BulletView {
                    bullet_id: bullet.bullet_id.clone(),
                    player_id: bullet.player_id.clone(),
                    x: bullet.x,
                    y: bullet.y,
                    dx: bullet.dx,
                    dy: bullet.dy,
                })
                .collect(),
            scores: self.scores.clone(),
            running: self.running,
        }
    }

    /// Flips the snapshot's running flag, announcing the change.
    pub fn set_running(&mut self, running: bool) {
        if self.running == running {
            return;
        }
        self.running = running;
        self.events
            .emit(EventScope::Global, GameEvent::GameStateChange { running });
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.get(player_id)
    }

    pub fn score(&self, player_id: &str) -> Option<u32> {
        self.scores.get(player_id).copied()
    }

    pub fn bullets(&self) -> impl Iterator<Item = &Bullet> {
        self.bullets.values()
    }

    pub fn respawn_tasks(&self) -> impl Iterator<Item = &RespawnTask> {
        self.respawn_queue.iter()
    }

    pub fn is_waiting(&self, player_id: &str) -> bool {
        self.waiting.iter().any(|waiting_id| waiting_id == player_id)
    }

    pub fn has_disconnected_record(&self, player_id: &str) -> bool {
        self.disconnected.contains_key(player_id)
    }

    /// Places the player at the first clear spawn point, emitting `spawn`
    /// and, on a player's first placement, `playerJoined`.
    fn try_place(&mut self, player_id: &str) -> Option<Point> {
        let live = self.live_positions();
        let index = spawn::first_available(&self.board, &live, self.rules.spawn_clear_radius)?;
        let point = self.board.spawn_points()[index];

        let player = self.players.get_mut(player_id)?;
        let first_spawn = !player.has_spawned;
        let player_name = player.player_name.clone();
        player.place_at(point, index);

        self.events.emit(
            EventScope::Targeted(player_id.to_string()),
            GameEvent::Spawn {
                player_id: player_id.to_string(),
                position: point,
                spawn_index: index,
            },
        );
        if first_spawn {
            self.events.emit(
                EventScope::Global,
                GameEvent::PlayerJoined {
                    player_id: player_id.to_string(),
                    player_name,
                },
            );
        }
        Some(point)
    }

    fn live_positions(&self) -> Vec<Point> {
        self.players
            .values()
            .filter_map(|player| player.position())
            .collect()
    }

    /// The id of the live player occupying `point`, if any.
    fn occupant_id(&self, point: Point) -> Option<String> {
        self.players
            .values()
            .find(|player| player.position() == Some(point))
            .map(|player| player.player_id.clone())
    }
}
