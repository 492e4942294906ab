//! The fixed room registry: `room-1` .. `room-N`, created at startup and
//! never resized, each routed to independently by [`manager::LobbyManager`].

pub mod manager;
