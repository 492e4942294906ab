//! Typed error taxonomy for the room engine and the lobby registry.
//!
//! Each room reports errors local to its own state machine (`RoomError`),
//! and the lobby composes those via `#[from]` alongside routing failures of
//! its own (`ManagerError`).

use thiserror::Error;

/// Errors raised by a single room's lifecycle and join/start operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("room is full")]
    RoomFull,
    #[error("player not found")]
    PlayerNotFound,
    #[error("player is not the host")]
    NotHost,
    #[error("invalid lifecycle transition from {from} on {action}")]
    InvalidTransition { from: &'static str, action: &'static str },
}

/// Errors raised by the lobby registry routing join/input/exit requests to rooms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("room not found")]
    RoomNotFound,
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl ManagerError {
    /// Wire error code sent back to the client in an `err` message.
    pub fn wire_code(&self) -> &'static str {
        match self {
            ManagerError::RoomNotFound => "ROOM_NOT_FOUND",
            ManagerError::Room(RoomError::RoomFull) => "ROOM_FULL",
            ManagerError::Room(RoomError::PlayerNotFound) => "PLAYER_NOT_FOUND",
            ManagerError::Room(RoomError::NotHost) => "NOT_HOST",
            ManagerError::Room(RoomError::InvalidTransition { .. }) => "INVALID_TRANSITION",
        }
    }
}
