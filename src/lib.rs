//! Snake Arena Server
//!
//! A real-time multiplayer snake game server. Players join a fixed pool of
//! rooms over a websocket, race AI-driven bots and each other around a grid,
//! and the simulation advances in lockstep ticks broadcast to everyone in a
//! room.

pub mod config;
pub mod error;
pub mod game;
pub mod id;
pub mod lobby;
pub mod metrics;
pub mod net;
