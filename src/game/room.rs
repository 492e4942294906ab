//! Room engine: one room's player map, food, lifecycle state machine, and
//! the four-phase tick that arbitrates simultaneous snake moves.
//!
//! A `Room` owns no transport of its own; the connection multiplexer drives
//! it through [`Room::join`], [`Room::input`], [`Room::start_request`],
//! [`Room::exit`], and the tick scheduler drives it through [`Room::poll`].
//! Every method here assumes the caller already holds the room's lock for
//! the duration of the call, per the one-mutex-per-room concurrency model.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::error::RoomError;
use crate::game::grid::{Cell, Direction};
use crate::game::player::{Player, PlayerRole};
use crate::game::policy::{decide_bot_direction, BotPolicy};
use crate::id::PlayerId;
use crate::net::protocol::{
    MapInfo, MoveEntry, PlayerInfo, RankEntry, RoomStatsEntry, ServerMessage, SnakeSnapshot,
    Snapshot, StartPlayer,
};

/// Bounded attempts for randomized placement (food, spawns, bot revival)
/// before giving up this tick rather than looping forever on a packed map.
const PLACEMENT_ATTEMPTS: usize = 200;

const COUNTDOWN_MIN_PLAYERS: usize = 2;

/// Fraction of the map (centered) that a revived bot may spawn into, so it
/// doesn't immediately wall itself against an edge it had no part in causing.
const REVIVE_INNER_FRACTION: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Idle,
    Waiting,
    Running,
    Finished,
}

impl RoomStatus {
    pub fn as_wire_str(self) -> &'static str {
        match self {
            RoomStatus::Idle => "idle",
            RoomStatus::Waiting => "waiting",
            RoomStatus::Running => "running",
            RoomStatus::Finished => "finished",
        }
    }
}

/// Everything `net::connection` needs to build the `join_ok` reply.
pub struct JoinOutcome {
    pub status: RoomStatus,
    pub map: MapInfo,
    pub players: Vec<PlayerInfo>,
    pub snapshot: Option<Snapshot>,
}

/// What one call to [`Room::tick`] produced. `delta` is absent only when the
/// round ended before any phase ran this tick (the top-of-tick end check).
pub struct TickOutcome {
    pub delta: Option<ServerMessage>,
    pub game_over: Option<ServerMessage>,
}

/// A snake's proposed move for this tick, before arbitration decides who
/// survives.
struct Intent {
    next_head: Cell,
    will_grow: bool,
    tail_to_free: Option<Cell>,
}

pub struct Room {
    pub id: String,
    pub capacity: usize,
    pub width: u16,
    pub height: u16,
    pub food_target: usize,
    pub countdown: Duration,
    status: RoomStatus,
    players: HashMap<PlayerId, Player>,
    /// Join order, oldest first; used for deterministic host/bot selection.
    order: Vec<PlayerId>,
    host_id: Option<PlayerId>,
    food: HashSet<Cell>,
    occupied_set: HashSet<Cell>,
    tick: u64,
    death_order: Vec<PlayerId>,
    countdown_deadline: Option<Instant>,
    pending_deaths: HashSet<PlayerId>,
    rng: StdRng,
}

impl Room {
    pub fn new(
        id: String,
        capacity: usize,
        width: u16,
        height: u16,
        food_target: usize,
        countdown: Duration,
        rng_seed: u64,
    ) -> Self {
        Self {
            id,
            capacity,
            width,
            height,
            food_target,
            countdown,
            status: RoomStatus::Idle,
            players: HashMap::new(),
            order: Vec::new(),
            host_id: None,
            food: HashSet::new(),
            occupied_set: HashSet::new(),
            tick: 0,
            death_order: Vec::new(),
            countdown_deadline: None,
            pending_deaths: HashSet::new(),
            rng: StdRng::seed_from_u64(rng_seed),
        }
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn map_info(&self) -> MapInfo {
        MapInfo { w: self.width, h: self.height }
    }

    /// Players that count against capacity: everyone except benched bots.
    pub fn counted_count(&self) -> usize {
        self.players.values().filter(|p| !p.is_benched()).count()
    }

    // ---- lifecycle: join / bots / input / start / exit ----------------

    pub fn add_bot(&mut self, id: PlayerId, name: String, policy: Arc<dyn BotPolicy>) {
        let bot = Player::new_bot(id, name, policy);
        self.players.insert(id, bot);
        self.order.push(id);
        if self.status == RoomStatus::Idle {
            self.status = RoomStatus::Waiting;
        }
    }

    pub fn join(
        &mut self,
        id: PlayerId,
        name: String,
        outbox: mpsc::Sender<ServerMessage>,
    ) -> Result<JoinOutcome, RoomError> {
        if self.counted_count() >= self.capacity {
            return Err(RoomError::RoomFull);
        }

        let player = Player::new_human(id, name, outbox);
        let snapshot = if self.status == RoomStatus::Running {
            Some(self.build_snapshot())
        } else {
            None
        };

        self.players.insert(id, player);
        self.order.push(id);
        if self.host_id.is_none() {
            self.host_id = Some(id);
        }
        self.rebalance_bots_for_humans();
        if self.status == RoomStatus::Idle {
            self.status = RoomStatus::Waiting;
        }

        let players = self
            .order
            .iter()
            .filter_map(|pid| self.players.get(pid).map(|p| PlayerInfo { id: *pid, name: p.name.clone() }))
            .collect();

        Ok(JoinOutcome { status: self.status, map: self.map_info(), players, snapshot })
    }

    /// Keeps exactly one resident (non-benched) bot once a human is present,
    /// so humans always see exactly one AI opponent.
    fn rebalance_bots_for_humans(&mut self) {
        let resident_bots: Vec<PlayerId> = self
            .order
            .iter()
            .filter(|id| self.players.get(id).map_or(false, |p| p.is_bot() && p.connected && !p.eliminated))
            .copied()
            .collect();
        for id in resident_bots.into_iter().skip(1) {
            if let Some(p) = self.players.get_mut(&id) {
                if p.alive {
                    for cell in p.body.drain(..) {
                        self.occupied_set.remove(&cell);
                    }
                    p.body_set.clear();
                }
                p.connected = false;
                p.alive = false;
                p.eliminated = false;
            }
        }
    }

    pub fn input(&mut self, id: PlayerId, dir_wire: &str) {
        let Some(dir) = Direction::from_wire_str(dir_wire) else { return };
        if let Some(player) = self.players.get_mut(&id) {
            if !player.alive {
                return;
            }
            player.request_direction(dir);
        }
    }

    pub fn start_request(&mut self, requester: PlayerId) -> Result<ServerMessage, RoomError> {
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::InvalidTransition { from: "waiting", action: "start_request" });
        }
        if self.host_id != Some(requester) {
            return Err(RoomError::NotHost);
        }
        Ok(self.start_round())
    }

    /// Client-initiated EXIT or a transport-level close: both end up here.
    pub fn exit(&mut self, id: PlayerId) {
        match self.status {
            RoomStatus::Running => {
                if let Some(p) = self.players.get_mut(&id) {
                    p.connected = false;
                }
                self.pending_deaths.insert(id);
            }
            _ => {
                self.players.remove(&id);
                self.order.retain(|&pid| pid != id);
                if self.counted_count() == 0 {
                    self.status = RoomStatus::Idle;
                    self.countdown_deadline = None;
                }
            }
        }
        if self.host_id == Some(id) {
            self.host_id = None;
            self.reelect_host();
        }
        self.reset_bot_scores_if_all_humans_gone();
    }

    fn reelect_host(&mut self) {
        if let Some(hid) = self.host_id {
            if self.players.get(&hid).map_or(false, |p| p.connected) {
                return;
            }
        }
        self.host_id = self
            .order
            .iter()
            .find(|pid| self.players.get(pid).map_or(false, |p| p.connected))
            .copied();
    }

    fn reset_bot_scores_if_all_humans_gone(&mut self) {
        let any_human_connected = self.players.values().any(|p| !p.is_bot() && p.connected);
        if !any_human_connected {
            for p in self.players.values_mut() {
                if p.is_bot() {
                    p.score = 0;
                }
            }
        }
    }

    // ---- scheduler entry points ----------------------------------------

    /// Called once per global tick for a WAITING room: checks the auto-start
    /// triggers and arms/disarms the countdown. Returns the `game_start`
    /// message if the round just began.
    pub fn try_autostart(&mut self, now: Instant) -> Option<ServerMessage> {
        if self.status != RoomStatus::Waiting {
            return None;
        }
        let count = self.counted_count();
        if count >= self.capacity {
            return Some(self.start_round());
        }
        if count >= COUNTDOWN_MIN_PLAYERS {
            match self.countdown_deadline {
                None => {
                    self.countdown_deadline = Some(now + self.countdown);
                    None
                }
                Some(deadline) if now >= deadline => Some(self.start_round()),
                Some(_) => None,
            }
        } else {
            self.countdown_deadline = None;
            None
        }
    }

    /// Advances the simulation by one tick. Returns `None` if the room isn't
    /// RUNNING (the scheduler should simply skip it).
    pub fn tick(&mut self) -> Option<TickOutcome> {
        if self.status != RoomStatus::Running {
            return None;
        }

        if self.check_end_condition() {
            return Some(TickOutcome { delta: None, game_over: Some(self.finish_round()) });
        }

        self.tick += 1;
        let alive_ids: Vec<PlayerId> =
            self.players.iter().filter(|(_, p)| p.alive).map(|(id, _)| *id).collect();

        // Phase 1: intent.
        let mut intents: HashMap<PlayerId, Intent> = HashMap::with_capacity(alive_ids.len());
        for id in &alive_ids {
            let (current_direction, head) = {
                let p = self.players.get(id).expect("alive player vanished mid-tick");
                (p.direction, p.head().expect("alive player has empty body"))
            };
            let chosen_direction = {
                let p = self.players.get(id).unwrap();
                match &p.role {
                    PlayerRole::Bot { policy } => decide_bot_direction(
                        policy.as_ref(),
                        head,
                        current_direction,
                        &self.occupied_set,
                        &self.food,
                        self.width,
                        self.height,
                    ),
                    PlayerRole::Human { .. } => p.pending_direction.unwrap_or(current_direction),
                }
            };
            let p = self.players.get_mut(id).unwrap();
            p.direction = chosen_direction;
            p.pending_direction = None;

            let next_head = head.stepped(chosen_direction);
            let will_grow = self.food.contains(&next_head);
            let tail_to_free = if will_grow { None } else { p.tail() };
            intents.insert(*id, Intent { next_head, will_grow, tail_to_free });
        }

        // Phase 2: arbitration.
        let mut dying: HashSet<PlayerId> = self.pending_deaths.drain().collect();
        let mut reasons: HashMap<PlayerId, &'static str> =
            dying.iter().map(|&id| (id, "disconnect")).collect();
        let tails_to_free: HashSet<Cell> =
            intents.values().filter_map(|i| i.tail_to_free).collect();

        for (&id, intent) in intents.iter() {
            if dying.contains(&id) {
                continue;
            }
            let nh = intent.next_head;
            if !nh.in_bounds(self.width, self.height) {
                dying.insert(id);
                reasons.insert(id, "wall");
                continue;
            }
            if self.occupied_set.contains(&nh) && !tails_to_free.contains(&nh) {
                dying.insert(id);
                reasons.insert(id, "body");
                continue;
            }
            let head_on = intents.iter().any(|(&other_id, other)| other_id != id && other.next_head == nh);
            if head_on {
                dying.insert(id);
                reasons.insert(id, "head-on");
            }
        }

        // Phase 3: commit survivors.
        let mut moves: Vec<MoveEntry> = Vec::new();
        let mut food_eaten = false;
        let mut survivors: Vec<PlayerId> =
            alive_ids.iter().filter(|id| !dying.contains(id)).copied().collect();
        survivors.sort();

        // Every surviving snake's new head, computed before any mutation.
        // A vacated tail cell that coincides with another survivor's new
        // head must stay in `occupied_set` — it's no longer empty, just
        // occupied by a different snake now.
        let survivor_next_heads: HashSet<Cell> =
            survivors.iter().map(|id| intents[id].next_head).collect();

        for id in &survivors {
            let intent = &intents[id];
            let nh = intent.next_head;
            let p = self.players.get_mut(id).unwrap();
            p.body.push_front(nh);
            p.body_set.insert(nh);
            self.occupied_set.insert(nh);

            if intent.will_grow {
                p.score += 1;
                self.food.remove(&nh);
                food_eaten = true;
                moves.push(MoveEntry::alive_move(*id, nh.into(), None, p.score));
            } else {
                let tail = p.body.pop_back().expect("non-growing snake has a tail to free");
                if tail != nh {
                    p.body_set.remove(&tail);
                    if !survivor_next_heads.contains(&tail) {
                        self.occupied_set.remove(&tail);
                    }
                }
                moves.push(MoveEntry::alive_move(*id, nh.into(), Some(tail.into()), p.score));
            }
        }

        // Phase 4: death cleanup.
        let humans_alive_before = self.players.values().filter(|p| p.alive && !p.is_bot()).count();
        let mut dying_sorted: Vec<PlayerId> = dying.into_iter().collect();
        dying_sorted.sort();
        for id in &dying_sorted {
            let Some(p) = self.players.get_mut(id) else { continue };
            if !p.alive {
                continue;
            }
            p.score /= 2;
            p.alive = false;
            p.eliminated = true;
            for cell in p.body.drain(..) {
                self.occupied_set.remove(&cell);
            }
            p.body_set.clear();
            self.death_order.push(*id);
            let reason = reasons.get(id).copied().unwrap_or("disconnect");
            moves.push(MoveEntry::death(*id, reason));
        }

        if food_eaten {
            self.spawn_food();
        }

        let humans_alive_after = self.players.values().filter(|p| p.alive && !p.is_bot()).count();
        if humans_alive_before > 0 && humans_alive_after == 0 {
            let bots_alive = self.players.values().filter(|p| p.alive && p.is_bot()).count();
            let benched = self.players.values().filter(|p| p.is_benched()).count();
            if bots_alive >= 1 && benched >= 1 {
                if let Some(entry) = self.revive_one_bot() {
                    moves.push(entry);
                }
            }
        }

        let delta = ServerMessage::Delta {
            tick: self.tick,
            moves,
            food: self.food.iter().map(|&c| c.into()).collect(),
        };

        let game_over =
            if self.check_end_condition() { Some(self.finish_round()) } else { None };

        Some(TickOutcome { delta: Some(delta), game_over })
    }

    /// Fans a message out to every connected human in the room. Used for
    /// `game_start` replies to a manual `start_request`, which must reach
    /// everyone, not just the requester.
    pub fn broadcast(&self, message: &ServerMessage) {
        for p in self.players.values() {
            p.try_send(message.clone());
        }
    }

    /// `(alive players, benched bots)` in this room, for the metrics sampler;
    /// not part of the wire `room_stats` reply.
    pub fn live_counts(&self) -> (usize, usize) {
        let alive = self.players.values().filter(|p| p.alive).count();
        let benched = self.players.values().filter(|p| p.is_benched()).count();
        (alive, benched)
    }

    pub fn stats(&self) -> RoomStatsEntry {
        let connected_players = self.players.values().filter(|p| p.connected && !p.is_bot()).count();
        let bots_present = self.players.values().any(|p| p.is_bot() && p.connected);
        let display_players = if connected_players == 0 && bots_present { 1 } else { connected_players };
        let used_slots = self.counted_count();
        RoomStatsEntry {
            room_id: self.id.clone(),
            status: self.status.as_wire_str().to_string(),
            connected_players,
            display_players,
            used_slots,
            capacity: self.capacity,
            available_slots: self.capacity.saturating_sub(used_slots),
        }
    }

    // ---- end-of-round ----------------------------------------------------

    fn check_end_condition(&self) -> bool {
        let alive: Vec<&Player> = self.players.values().filter(|p| p.alive).collect();
        let alive_count = alive.len();
        if alive_count == 0 {
            return true;
        }
        let counted = self.counted_count();
        let h_alive = alive.iter().filter(|p| !p.is_bot()).count();
        let a_alive = alive.iter().filter(|p| p.is_bot()).count();
        let b_benched = self.players.values().filter(|p| p.is_benched()).count();
        let ai_showdown = h_alive == 0 && a_alive == 1 && b_benched > 0;
        if counted >= 2 && alive_count <= 1 && !ai_showdown {
            return true;
        }
        let h_total = self.players.values().filter(|p| !p.is_bot()).count();
        if h_total > 0 && h_alive == 0 && a_alive == 0 {
            return true;
        }
        false
    }

    fn finish_round(&mut self) -> ServerMessage {
        let mut ranks = Vec::new();
        let mut rank = 1u32;

        let alive_ids: Vec<PlayerId> =
            self.players.iter().filter(|(_, p)| p.alive).map(|(id, _)| *id).collect();
        for id in &alive_ids {
            let score = self.players[id].score;
            ranks.push(RankEntry { id: *id, rank, score });
            rank += 1;
        }
        for id in self.death_order.iter().rev() {
            if let Some(p) = self.players.get(id) {
                ranks.push(RankEntry { id: *id, rank, score: p.score });
                rank += 1;
            }
        }

        let winner = self.players.values().max_by(|a, b| {
            a.score.cmp(&b.score).then_with(|| b.name.cmp(&a.name)).then_with(|| b.id.cmp(&a.id))
        });
        let (winner_id, winner_name) = match winner {
            Some(p) => (Some(p.id), Some(p.name.clone())),
            None => (None, None),
        };
        let ended_tick = self.tick;

        self.food.clear();
        self.occupied_set.clear();
        self.death_order.clear();
        self.countdown_deadline = None;
        for p in self.players.values_mut() {
            p.score = 0;
            p.body.clear();
            p.body_set.clear();
            p.alive = false;
            p.eliminated = false;
            p.pending_direction = None;
        }
        self.status = if self.counted_count() > 0 { RoomStatus::Waiting } else { RoomStatus::Idle };
        self.reelect_host();

        ServerMessage::GameOver { ranks, winner_id, winner_name, ended_tick }
    }

    // ---- spawning --------------------------------------------------------

    fn start_round(&mut self) -> ServerMessage {
        self.status = RoomStatus::Running;
        self.tick = 0;
        self.countdown_deadline = None;
        self.food.clear();
        self.occupied_set.clear();

        let active_ids: Vec<PlayerId> = self
            .order
            .iter()
            .filter(|id| self.players.get(id).map_or(false, |p| p.connected && !p.is_benched()))
            .copied()
            .collect();

        let mut start_players = Vec::with_capacity(active_ids.len());
        for id in &active_ids {
            let spawn = self
                .random_cell_in_fraction(1.0)
                .unwrap_or_else(|| Cell::new(self.width as i32 / 2, self.height as i32 / 2));
            let p = self.players.get_mut(id).unwrap();
            p.spawn_body(spawn, Direction::Right);
            p.alive = true;
            self.occupied_set.extend(p.body.iter().copied());
            start_players.push(StartPlayer {
                id: *id,
                name: p.name.clone(),
                body: p.body.iter().map(|&c| c.into()).collect(),
            });
        }

        self.spawn_food();

        ServerMessage::GameStart {
            tick_id: 0,
            food: self.food.iter().map(|&c| c.into()).collect(),
            players: start_players,
        }
    }

    fn revive_one_bot(&mut self) -> Option<MoveEntry> {
        let benched_id = self
            .order
            .iter()
            .find(|id| self.players.get(id).map_or(false, |p| p.is_benched()))
            .copied()?;
        let spawn = self.random_cell_in_fraction(REVIVE_INNER_FRACTION)?;
        let p = self.players.get_mut(&benched_id)?;
        p.connected = true;
        p.spawn_body(spawn, Direction::Right);
        p.alive = true;
        let score = p.score;
        let body: Vec<[i32; 2]> = p.body.iter().map(|&c| c.into()).collect();
        self.occupied_set.extend(
            body.iter().map(|&[x, y]| Cell::new(x, y)),
        );
        Some(MoveEntry::revival(benched_id, body, score))
    }

    fn spawn_food(&mut self) {
        while self.food.len() < self.food_target {
            match self.random_cell_in_fraction(1.0) {
                Some(cell) => {
                    self.food.insert(cell);
                }
                None => break,
            }
        }
    }

    /// Picks a uniformly random free cell (not in `occupied_set` or `food`)
    /// within the centered rectangle covering `frac` of each dimension.
    /// `frac = 1.0` covers the whole map. Gives up after bounded attempts.
    fn random_cell_in_fraction(&mut self, frac: f64) -> Option<Cell> {
        let margin_x = ((self.width as f64) * (1.0 - frac) / 2.0).round() as i32;
        let margin_y = ((self.height as f64) * (1.0 - frac) / 2.0).round() as i32;
        let lo_x = margin_x;
        let hi_x = (self.width as i32 - margin_x).max(lo_x + 1);
        let lo_y = margin_y;
        let hi_y = (self.height as i32 - margin_y).max(lo_y + 1);

        for _ in 0..PLACEMENT_ATTEMPTS {
            let x = self.rng.gen_range(lo_x..hi_x);
            let y = self.rng.gen_range(lo_y..hi_y);
            let cell = Cell::new(x, y);
            if !self.occupied_set.contains(&cell) && !self.food.contains(&cell) {
                return Some(cell);
            }
        }
        None
    }

    fn build_snapshot(&self) -> Snapshot {
        let mut snakes = HashMap::new();
        for (id, p) in &self.players {
            if p.alive {
                snakes.insert(
                    *id,
                    SnakeSnapshot {
                        body: p.body.iter().map(|&c| c.into()).collect(),
                        name: p.name.clone(),
                        score: p.score,
                        alive: p.alive,
                    },
                );
            }
        }
        Snapshot { snakes, food: self.food.iter().map(|&c| c.into()).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::policy::HoldDirectionPolicy;

    fn test_room(width: u16, height: u16) -> Room {
        Room::new("room-1".to_string(), 10, width, height, 3, Duration::from_secs(5), 42)
    }

    fn outbox() -> (mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(32)
    }

    fn place_snake(room: &mut Room, id: PlayerId, name: &str, body: &[(i32, i32)], dir: Direction) {
        let (tx, _rx) = outbox();
        room.join(id, name.to_string(), tx).unwrap();
        let p = room.players.get_mut(&id).unwrap();
        p.body.clear();
        p.body_set.clear();
        for &(x, y) in body {
            let c = Cell::new(x, y);
            p.body.push_back(c);
            p.body_set.insert(c);
        }
        p.direction = dir;
        p.alive = true;
        room.occupied_set.extend(p.body.iter().copied());
    }

    fn id_n(n: u8) -> PlayerId {
        let mut rng = rand::thread_rng();
        let _ = n;
        PlayerId::generate(&mut rng)
    }

    #[test]
    fn forward_move_shifts_body_and_occupied_set() {
        let mut room = test_room(5, 5);
        room.status = RoomStatus::Running;
        room.food.clear();
        let a = id_n(0);
        place_snake(&mut room, a, "alice", &[(2, 2), (1, 2), (0, 2)], Direction::Right);

        let outcome = room.tick().unwrap();
        let delta = outcome.delta.unwrap();
        match delta {
            ServerMessage::Delta { moves, .. } => {
                assert_eq!(moves.len(), 1);
            }
            _ => panic!("expected delta"),
        }
        let p = room.players.get(&a).unwrap();
        assert_eq!(p.body.iter().copied().collect::<Vec<_>>(), vec![Cell::new(3, 2), Cell::new(2, 2), Cell::new(1, 2)]);
        assert!(p.alive);
        assert_eq!(p.score, 0);
        assert_eq!(room.occupied_set, [Cell::new(3, 2), Cell::new(2, 2), Cell::new(1, 2)].into_iter().collect());
    }

    #[test]
    fn head_on_collision_kills_both_symmetrically() {
        let mut room = test_room(6, 5);
        room.status = RoomStatus::Running;
        room.food.clear();
        let a = id_n(0);
        let b = id_n(1);
        place_snake(&mut room, a, "alice", &[(2, 2), (1, 2)], Direction::Right);
        place_snake(&mut room, b, "bob", &[(4, 2), (5, 2)], Direction::Left);

        let outcome = room.tick().unwrap();
        let delta = outcome.delta.unwrap();
        match delta {
            ServerMessage::Delta { moves, .. } => {
                assert_eq!(moves.len(), 2);
                assert!(moves.iter().all(|m| m.dead == Some(true) && m.reason.as_deref() == Some("head-on")));
            }
            _ => panic!("expected delta"),
        }
        assert!(!room.players[&a].alive);
        assert!(!room.players[&b].alive);
        assert!(!room.occupied_set.contains(&Cell::new(3, 2)));
    }

    #[test]
    fn eating_grows_and_replenishes_food() {
        let mut room = test_room(5, 5);
        room.status = RoomStatus::Running;
        room.food.clear();
        room.food.insert(Cell::new(3, 2));
        room.food.insert(Cell::new(0, 0));
        room.food.insert(Cell::new(4, 4));
        let a = id_n(0);
        place_snake(&mut room, a, "alice", &[(2, 2), (1, 2)], Direction::Right);

        let outcome = room.tick().unwrap();
        let p = room.players.get(&a).unwrap();
        assert_eq!(p.body.iter().copied().collect::<Vec<_>>(), vec![Cell::new(3, 2), Cell::new(2, 2), Cell::new(1, 2)]);
        assert_eq!(p.score, 1);
        assert!(p.alive);
        assert!(!room.food.contains(&Cell::new(3, 2)));
        assert_eq!(room.food.len(), 3);
        match outcome.delta.unwrap() {
            ServerMessage::Delta { moves, .. } => {
                assert_eq!(moves[0].score, Some(1));
            }
            _ => panic!("expected delta"),
        }
    }

    #[test]
    fn wall_collision_kills_and_halves_score() {
        let mut room = test_room(5, 5);
        room.status = RoomStatus::Running;
        room.food.clear();
        let a = id_n(0);
        place_snake(&mut room, a, "alice", &[(0, 0), (1, 0)], Direction::Up);
        {
            let p = room.players.get_mut(&a).unwrap();
            p.score = 5;
            p.request_direction(Direction::Left);
        }

        let outcome = room.tick().unwrap();
        let p = room.players.get(&a).unwrap();
        assert!(!p.alive);
        assert!(p.eliminated);
        assert_eq!(p.score, 2);
        match outcome.delta.unwrap() {
            ServerMessage::Delta { moves, .. } => {
                assert_eq!(moves[0].reason.as_deref(), Some("wall"));
            }
            _ => panic!("expected delta"),
        }
    }

    #[test]
    fn tail_chase_cell_stays_occupied_and_is_not_growth() {
        let mut room = test_room(5, 5);
        room.status = RoomStatus::Running;
        room.food.clear();
        let a = id_n(0);
        // A loop: head about to step onto its own current tail cell.
        place_snake(
            &mut room,
            a,
            "alice",
            &[(1, 1), (2, 1), (2, 2), (1, 2), (1, 0)],
            Direction::Up,
        );
        let tail = *room.players[&a].body.back().unwrap();
        let head = *room.players[&a].body.front().unwrap();
        assert_eq!(head.stepped(Direction::Up), tail);

        let outcome = room.tick().unwrap();
        let p = room.players.get(&a).unwrap();
        assert!(p.alive);
        assert_eq!(p.score, 0);
        assert_eq!(p.body.len(), 5);
        assert!(room.occupied_set.contains(&tail));
    }

    #[test]
    fn following_into_a_vacated_tail_does_not_evict_the_follower() {
        // A moves its head onto the cell B's tail is vacating this same
        // tick. Both survive; the cell must remain in occupied_set since A
        // now occupies it, regardless of which snake's commit runs first.
        let mut room = test_room(6, 5);
        room.status = RoomStatus::Running;
        room.food.clear();
        let a = id_n(0);
        let b = id_n(1);
        place_snake(&mut room, a, "alice", &[(2, 2), (1, 2)], Direction::Right);
        place_snake(&mut room, b, "bob", &[(4, 2), (3, 2)], Direction::Up);

        let outcome = room.tick().unwrap();
        match outcome.delta.unwrap() {
            ServerMessage::Delta { moves, .. } => {
                assert_eq!(moves.len(), 2);
                assert!(moves.iter().all(|m| m.alive == Some(true)));
            }
            _ => panic!("expected delta"),
        }
        assert!(room.players[&a].alive);
        assert!(room.players[&b].alive);
        assert_eq!(room.players[&a].head(), Some(Cell::new(3, 2)));
        assert!(room.occupied_set.contains(&Cell::new(3, 2)));
        assert!(!room.occupied_set.contains(&Cell::new(1, 2)));

        let expected: HashSet<Cell> = room
            .players
            .values()
            .filter(|p| p.alive)
            .flat_map(|p| p.body_set.iter().copied())
            .collect();
        assert_eq!(room.occupied_set, expected);
    }

    #[test]
    fn benching_an_alive_bot_clears_its_body_from_occupied_set() {
        let policy: Arc<dyn BotPolicy> = Arc::new(HoldDirectionPolicy);
        let mut room = test_room(10, 10);
        let bot1 = id_n(0);
        let bot2 = id_n(1);
        room.add_bot(bot1, "bot-1".to_string(), policy.clone());
        room.add_bot(bot2, "bot-2".to_string(), policy);

        // Simulate both bots having spawned into a running round before any
        // human arrives, the way start_round would.
        room.status = RoomStatus::Running;
        {
            let p = room.players.get_mut(&bot1).unwrap();
            p.spawn_body(Cell::new(5, 5), Direction::Right);
            p.alive = true;
        }
        {
            let p = room.players.get_mut(&bot2).unwrap();
            p.spawn_body(Cell::new(2, 2), Direction::Right);
            p.alive = true;
        }
        room.occupied_set.clear();
        room.occupied_set.extend(room.players[&bot1].body.iter().copied());
        room.occupied_set.extend(room.players[&bot2].body.iter().copied());

        let (tx, _rx) = outbox();
        let human = id_n(2);
        room.join(human, "alice".to_string(), tx).unwrap();

        let benched_id = if room.players[&bot1].is_benched() { bot1 } else { bot2 };
        let resident_id = if benched_id == bot1 { bot2 } else { bot1 };

        let benched = &room.players[&benched_id];
        assert!(benched.is_benched());
        assert!(benched.body.is_empty());
        assert!(benched.body_set.is_empty());
        for cell in room.players[&resident_id].body.iter() {
            assert!(!room.players[&benched_id].body_set.contains(cell));
        }

        let expected: HashSet<Cell> = room
            .players
            .values()
            .filter(|p| p.alive)
            .flat_map(|p| p.body_set.iter().copied())
            .collect();
        assert_eq!(room.occupied_set, expected);
    }

    #[test]
    fn reverse_input_is_ignored() {
        let mut room = test_room(5, 5);
        let a = id_n(0);
        let (tx, _rx) = outbox();
        room.join(a, "alice".to_string(), tx).unwrap();
        let p = room.players.get_mut(&a).unwrap();
        p.direction = Direction::Right;
        p.alive = true;
        room.input(a, "left");
        assert!(room.players[&a].pending_direction.is_none());
        room.input(a, "down");
        assert_eq!(room.players[&a].pending_direction, Some(Direction::Down));
    }

    #[test]
    fn spectator_join_while_running_gets_snapshot_and_never_moves() {
        let mut room = test_room(10, 10);
        room.status = RoomStatus::Running;
        let a = id_n(0);
        place_snake(&mut room, a, "alice", &[(5, 5), (4, 5)], Direction::Right);

        let spectator = id_n(1);
        let (tx, _rx) = outbox();
        let outcome = room.join(spectator, "spectator".to_string(), tx).unwrap();
        assert_eq!(outcome.status, RoomStatus::Running);
        let snapshot = outcome.snapshot.expect("spectator should receive a snapshot");
        assert!(snapshot.snakes.contains_key(&a));
        assert!(!room.players[&spectator].alive);
    }

    #[test]
    fn room_full_rejects_join() {
        let mut room = Room::new("room-1".to_string(), 1, 10, 10, 3, Duration::from_secs(5), 1);
        let (tx1, _rx1) = outbox();
        room.join(id_n(0), "a".to_string(), tx1).unwrap();
        let (tx2, _rx2) = outbox();
        let err = room.join(id_n(1), "b".to_string(), tx2).unwrap_err();
        assert_eq!(err, RoomError::RoomFull);
    }

    #[test]
    fn only_host_can_manual_start() {
        let mut room = test_room(10, 10);
        let (tx1, _rx1) = outbox();
        let host = id_n(0);
        room.join(host, "host".to_string(), tx1).unwrap();
        let (tx2, _rx2) = outbox();
        let other = id_n(1);
        room.join(other, "other".to_string(), tx2).unwrap();

        let err = room.start_request(other).unwrap_err();
        assert_eq!(err, RoomError::NotHost);
        room.start_request(host).unwrap();
        assert_eq!(room.status(), RoomStatus::Running);
    }

    #[test]
    fn live_counts_reports_alive_and_benched() {
        let policy: Arc<dyn BotPolicy> = Arc::new(HoldDirectionPolicy);
        let mut room = test_room(10, 10);
        room.add_bot(id_n(0), "bot-1".to_string(), policy.clone());
        room.add_bot(id_n(1), "bot-2".to_string(), policy);
        let (tx, _rx) = outbox();
        let human = id_n(2);
        room.join(human, "alice".to_string(), tx).unwrap();

        // rebalance_bots_for_humans benches all but one resident bot.
        let (alive, benched) = room.live_counts();
        assert_eq!(alive, 0);
        assert_eq!(benched, 1);
    }

    #[test]
    fn policy_fallback_holds_direction() {
        let policy: Arc<dyn BotPolicy> = Arc::new(HoldDirectionPolicy);
        let mut room = test_room(10, 10);
        room.status = RoomStatus::Running;
        room.food.clear();
        let bot = id_n(0);
        room.add_bot(bot, "bot".to_string(), policy);
        let p = room.players.get_mut(&bot).unwrap();
        p.spawn_body(Cell::new(5, 5), Direction::Right);
        p.alive = true;
        room.occupied_set.extend(p.body.iter().copied());

        room.tick().unwrap();
        assert_eq!(room.players[&bot].direction, Direction::Right);
    }
}
