//! Player state: identity, connection role, and snake body.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::game::grid::{Cell, Direction};
use crate::game::policy::BotPolicy;
use crate::id::PlayerId;
use crate::net::protocol::ServerMessage;

/// How a player is connected to the room: a human behind a live outbound
/// queue, or a bot driven by a shared inference policy. Replaces any
/// `is_bot` attribute check with an exhaustive match at every call site that
/// cares about the distinction.
pub enum PlayerRole {
    Human {
        outbox: mpsc::Sender<ServerMessage>,
    },
    Bot {
        policy: Arc<dyn BotPolicy>,
    },
}

impl PlayerRole {
    pub fn is_bot(&self) -> bool {
        matches!(self, PlayerRole::Bot { .. })
    }
}

/// A participant in a room: either an active snake, a spectator (alive=false,
/// empty body, connected=true), or an eliminated/benched entry kept around
/// for bookkeeping.
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: PlayerRole,
    pub connected: bool,
    pub alive: bool,
    pub eliminated: bool,
    pub score: u32,
    pub direction: Direction,
    /// Direction requested by the most recent valid `in` message, applied at
    /// the start of the next tick and then cleared. `None` keeps heading.
    pub pending_direction: Option<Direction>,
    pub body: VecDeque<Cell>,
    pub body_set: HashSet<Cell>,
}

impl Player {
    pub fn new_human(id: PlayerId, name: String, outbox: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            name,
            role: PlayerRole::Human { outbox },
            connected: true,
            alive: false,
            eliminated: false,
            score: 0,
            direction: Direction::Right,
            pending_direction: None,
            body: VecDeque::new(),
            body_set: HashSet::new(),
        }
    }

    pub fn new_bot(id: PlayerId, name: String, policy: Arc<dyn BotPolicy>) -> Self {
        Self {
            id,
            name,
            role: PlayerRole::Bot { policy },
            connected: true,
            alive: false,
            eliminated: false,
            score: 0,
            direction: Direction::Right,
            pending_direction: None,
            body: VecDeque::new(),
            body_set: HashSet::new(),
        }
    }

    pub fn is_bot(&self) -> bool {
        self.role.is_bot()
    }

    /// A benched bot is hidden from human lobbies: resident but not counted
    /// against capacity, kept around to be revived later.
    pub fn is_benched(&self) -> bool {
        self.is_bot() && !self.connected && !self.alive && !self.eliminated
    }

    /// Records a direction request from an `in` message. Rejected silently
    /// if it reverses the snake's current heading; multiple requests between
    /// ticks collapse to the latest valid one.
    pub fn request_direction(&mut self, dir: Direction) {
        if !dir.is_reverse_of(self.direction) {
            self.pending_direction = Some(dir);
        }
    }

    pub fn head(&self) -> Option<Cell> {
        self.body.front().copied()
    }

    pub fn tail(&self) -> Option<Cell> {
        self.body.back().copied()
    }

    /// Places a fresh length-3 body at `head`, pointed `direction`, replacing
    /// any prior body. Used both for round start and for mid-round bot revival.
    pub fn spawn_body(&mut self, head: Cell, direction: Direction) {
        self.body.clear();
        self.body_set.clear();
        let mut cell = head;
        self.body.push_back(cell);
        self.body_set.insert(cell);
        let behind = direction.reverse();
        for _ in 0..2 {
            cell = cell.stepped(behind);
            self.body.push_back(cell);
            self.body_set.insert(cell);
        }
        self.direction = direction;
    }

    /// Sends a message to this player if it is a connected human; a failed or
    /// full queue is swallowed here and surfaces only as a dead outbox on the
    /// next send, per the no-blocking broadcast contract.
    pub fn try_send(&self, message: ServerMessage) {
        if let PlayerRole::Human { outbox } = &self.role {
            let _ = outbox.try_send(message);
        }
    }

    /// Whether this human's outbox has been dropped (the connection is dead).
    pub fn outbox_closed(&self) -> bool {
        match &self.role {
            PlayerRole::Human { outbox } => outbox.is_closed(),
            PlayerRole::Bot { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::policy::HoldDirectionPolicy;

    fn make_bot(id: PlayerId) -> Player {
        Player::new_bot(id, "bot".to_string(), Arc::new(HoldDirectionPolicy))
    }

    #[test]
    fn spawn_body_lays_out_three_cells_behind_head() {
        let mut rng = rand::thread_rng();
        let mut p = make_bot(PlayerId::generate(&mut rng));
        p.spawn_body(Cell::new(10, 10), Direction::Right);
        assert_eq!(p.body.len(), 3);
        assert_eq!(p.body[0], Cell::new(10, 10));
        assert_eq!(p.body[1], Cell::new(9, 10));
        assert_eq!(p.body[2], Cell::new(8, 10));
        assert_eq!(p.body_set.len(), 3);
    }

    #[test]
    fn role_reports_is_bot_without_a_flag() {
        let mut rng = rand::thread_rng();
        let bot = make_bot(PlayerId::generate(&mut rng));
        assert!(bot.is_bot());
    }
}
