//! Websocket transport: the wire protocol, the per-connection handler, and
//! the axum router plus tick scheduler that ties rooms to the outside world.

pub mod connection;
pub mod protocol;
pub mod server;
