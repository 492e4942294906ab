//! Wire message envelope: the JSON shapes exchanged with clients over the
//! websocket connection, tagged by a short "t" field.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::id::PlayerId;

/// Messages a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "t")]
pub enum ClientMessage {
    #[serde(rename = "join")]
    Join { room_id: String, username: String },
    #[serde(rename = "in")]
    Input { d: String },
    #[serde(rename = "start_request")]
    StartRequest {},
    #[serde(rename = "exit")]
    Exit {},
    #[serde(rename = "room_stats_req")]
    RoomStatsReq {},
}

/// Messages the server may send.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "t")]
pub enum ServerMessage {
    #[serde(rename = "join_ok")]
    JoinOk {
        room_id: String,
        status: String,
        map: MapInfo,
        players: Vec<PlayerInfo>,
        your_id: PlayerId,
        #[serde(skip_serializing_if = "Option::is_none")]
        snapshot: Option<Snapshot>,
    },
    #[serde(rename = "game_start")]
    GameStart {
        tick_id: u64,
        food: Vec<[i32; 2]>,
        players: Vec<StartPlayer>,
    },
    #[serde(rename = "d")]
    Delta {
        tick: u64,
        moves: Vec<MoveEntry>,
        food: Vec<[i32; 2]>,
    },
    #[serde(rename = "game_over")]
    GameOver {
        ranks: Vec<RankEntry>,
        winner_id: Option<PlayerId>,
        winner_name: Option<String>,
        ended_tick: u64,
    },
    #[serde(rename = "room_stats")]
    RoomStats { rooms: Vec<RoomStatsEntry> },
    #[serde(rename = "err")]
    Err { code: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct MapInfo {
    pub w: u16,
    pub h: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartPlayer {
    pub id: PlayerId,
    pub name: String,
    pub body: Vec<[i32; 2]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnakeSnapshot {
    pub body: Vec<[i32; 2]>,
    pub name: String,
    pub score: u32,
    pub alive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub snakes: HashMap<PlayerId, SnakeSnapshot>,
    pub food: Vec<[i32; 2]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankEntry {
    pub id: PlayerId,
    pub rank: u32,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomStatsEntry {
    pub room_id: String,
    pub status: String,
    pub connected_players: usize,
    pub display_players: usize,
    pub used_slots: usize,
    pub capacity: usize,
    pub available_slots: usize,
}

/// One entry in a `d` (delta) message's `moves` array. Modeled as a single
/// struct with optional fields rather than a tagged Rust enum because the
/// three shapes on the wire (alive move / death / revival) share most of
/// their fields and are consumed by clients as one loosely-typed object.
#[derive(Debug, Clone, Serialize, Default)]
pub struct MoveEntry {
    pub id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_add: Option<[i32; 2]>,
    /// `None` omits the field; `Some(None)` serializes as explicit JSON null.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail_remove: Option<Option<[i32; 2]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<[i32; 2]>>,
}

impl MoveEntry {
    pub fn alive_move(
        id: PlayerId,
        head_add: [i32; 2],
        tail_remove: Option<[i32; 2]>,
        score: u32,
    ) -> Self {
        Self {
            id: Some(id),
            head_add: Some(head_add),
            tail_remove: Some(tail_remove),
            score: Some(score),
            alive: Some(true),
            ..Default::default()
        }
    }

    pub fn death(id: PlayerId, reason: &str) -> Self {
        Self {
            id: Some(id),
            dead: Some(true),
            reason: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn revival(id: PlayerId, body: Vec<[i32; 2]>, score: u32) -> Self {
        Self {
            id: Some(id),
            revived: Some(true),
            body: Some(body),
            score: Some(score),
            alive: Some(true),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_join_decodes_from_tagged_json() {
        let json = r#"{"t":"join","room_id":"room-1","username":"alice"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Join { room_id, username } => {
                assert_eq!(room_id, "room-1");
                assert_eq!(username, "alice");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn client_input_decodes() {
        let json = r#"{"t":"in","d":"left"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::Input { d } if d == "left"));
    }

    #[test]
    fn move_entry_omits_absent_tail_remove_but_keeps_explicit_null() {
        let mut rng = rand::thread_rng();
        let id = PlayerId::generate(&mut rng);
        let grow = MoveEntry::alive_move(id, [1, 1], None, 1);
        let json = serde_json::to_string(&grow).unwrap();
        assert!(json.contains("\"tail_remove\":null"));

        let death = MoveEntry::death(id, "wall");
        let json = serde_json::to_string(&death).unwrap();
        assert!(!json.contains("tail_remove"));
        assert!(json.contains("\"dead\":true"));
    }

    #[test]
    fn server_message_tags_with_t_field() {
        let msg = ServerMessage::Err { code: "ROOM_FULL".to_string() };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.starts_with(r#"{"t":"err""#));
    }
}
