//! Routes connections to rooms. The room set is fixed at startup (`room-1`
//! through `room-N`); this registry never creates or destroys a room after
//! that, it only tracks which room each connected player is in and forwards
//! join/input/start/exit calls to the right one, taking that room's lock for
//! the duration of each call per the one-mutex-per-room model.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::config::ServerConfig;
use crate::error::ManagerError;
use crate::game::policy::BotPolicy;
use crate::game::room::{JoinOutcome, Room};
use crate::id::PlayerId;
use crate::net::protocol::{RoomStatsEntry, ServerMessage};

pub struct LobbyManager {
    rooms: HashMap<String, Arc<Mutex<Room>>>,
    room_ids: Vec<String>,
    player_rooms: Mutex<HashMap<PlayerId, String>>,
}

impl LobbyManager {
    /// Builds the fixed room set and seeds each room with `bots_per_room`
    /// bots sharing the same policy instance.
    pub fn new(config: &ServerConfig, policy: Arc<dyn BotPolicy>) -> Self {
        let mut rooms = HashMap::with_capacity(config.room_count);
        let mut room_ids = Vec::with_capacity(config.room_count);
        let mut rng = rand::thread_rng();

        for n in 1..=config.room_count {
            let room_id = format!("room-{n}");
            let mut room = Room::new(
                room_id.clone(),
                config.room_capacity,
                config.map_width,
                config.map_height,
                config.food_target,
                std::time::Duration::from_secs(config.countdown_secs),
                // Distinct per room so rooms don't share an RNG stream.
                (n as u64).wrapping_mul(0x9E3779B97F4A7C15),
            );
            for b in 0..config.bots_per_room {
                let bot_id = PlayerId::generate(&mut rng);
                room.add_bot(bot_id, format!("Bot-{}", b + 1), policy.clone());
            }
            room_ids.push(room_id.clone());
            rooms.insert(room_id, Arc::new(Mutex::new(room)));
        }

        Self { rooms, room_ids, player_rooms: Mutex::new(HashMap::new()) }
    }

    /// Room ids in creation order, for the `room_stats` listing.
    pub fn room_ids(&self) -> &[String] {
        &self.room_ids
    }

    /// Every room handle, for the tick scheduler to iterate.
    pub fn rooms(&self) -> impl Iterator<Item = &Arc<Mutex<Room>>> {
        self.rooms.values()
    }

    pub async fn join(
        &self,
        room_id: &str,
        player: PlayerId,
        name: String,
        outbox: mpsc::Sender<ServerMessage>,
    ) -> Result<JoinOutcome, ManagerError> {
        let room = self.rooms.get(room_id).cloned().ok_or(ManagerError::RoomNotFound)?;
        let outcome = {
            let mut locked = room.lock().await;
            locked.join(player, name, outbox)?
        };
        self.player_rooms.lock().await.insert(player, room_id.to_string());
        Ok(outcome)
    }

    pub async fn input(&self, player: PlayerId, dir_wire: &str) {
        let Some(room) = self.room_of(player).await else { return };
        room.lock().await.input(player, dir_wire);
    }

    /// Starts the round a requester's room is waiting in and broadcasts
    /// `game_start` to every player in that room.
    pub async fn start_request(&self, player: PlayerId) -> Result<(), ManagerError> {
        let room = self.room_of(player).await.ok_or(ManagerError::RoomNotFound)?;
        let mut locked = room.lock().await;
        let msg = locked.start_request(player)?;
        locked.broadcast(&msg);
        Ok(())
    }

    pub async fn exit(&self, player: PlayerId) {
        if let Some(room_id) = self.player_rooms.lock().await.remove(&player) {
            if let Some(room) = self.rooms.get(&room_id) {
                room.lock().await.exit(player);
            }
        }
    }

    pub async fn room_stats(&self) -> Vec<RoomStatsEntry> {
        let mut out = Vec::with_capacity(self.room_ids.len());
        for id in &self.room_ids {
            if let Some(room) = self.rooms.get(id) {
                out.push(room.lock().await.stats());
            }
        }
        out
    }

    /// `(total alive players, total benched bots)` across every room, for the
    /// metrics sampler.
    pub async fn live_counts(&self) -> (u64, u64) {
        let mut alive_total = 0u64;
        let mut benched_total = 0u64;
        for id in &self.room_ids {
            if let Some(room) = self.rooms.get(id) {
                let (alive, benched) = room.lock().await.live_counts();
                alive_total += alive as u64;
                benched_total += benched as u64;
            }
        }
        (alive_total, benched_total)
    }

    async fn room_of(&self, player: PlayerId) -> Option<Arc<Mutex<Room>>> {
        let room_id = self.player_rooms.lock().await.get(&player).cloned()?;
        self.rooms.get(&room_id).cloned()
    }
}
