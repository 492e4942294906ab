//! Per-connection websocket handling.
//!
//! Each connection gets a bounded outbound queue drained by one dedicated
//! send task; the tick loop only ever calls [`Player::try_send`] into that
//! queue, so a slow or dead client can never block the simulation. The read
//! half decodes client messages and routes them through the [`LobbyManager`]
//! to whichever room the connection has joined, and runs the heartbeat
//! watchdog that treats a silent connection as dead.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::id::PlayerId;
use crate::lobby::manager::LobbyManager;
use crate::metrics::Metrics;
use crate::net::protocol::{ClientMessage, ServerMessage};

const MAX_USERNAME_LEN: usize = 10;

/// Drives one websocket connection end to end: join/input/exit routing,
/// heartbeat, and cleanup on disconnect.
pub async fn handle_socket(
    socket: WebSocket,
    lobby: Arc<LobbyManager>,
    config: Arc<ServerConfig>,
    metrics: Arc<Metrics>,
) {
    use std::sync::atomic::Ordering;

    metrics.connections_active.fetch_add(1, Ordering::Relaxed);
    metrics.connections_total.fetch_add(1, Ordering::Relaxed);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(config.outbound_queue_capacity);
    let send_metrics = metrics.clone();

    let heartbeat_interval = Duration::from_secs(config.heartbeat_interval_secs);
    let send_task = tokio::spawn(async move {
        let mut ping_tick = tokio::time::interval(heartbeat_interval);
        ping_tick.tick().await; // the first tick fires immediately; skip it
        loop {
            tokio::select! {
                maybe_msg = rx.recv() => {
                    match maybe_msg {
                        Some(msg) => {
                            let Ok(text) = serde_json::to_string(&msg) else { continue };
                            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                            send_metrics.messages_sent_total.fetch_add(1, Ordering::Relaxed);
                        }
                        None => break,
                    }
                }
                _ = ping_tick.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut rng = rand::thread_rng();
    let my_id = PlayerId::generate(&mut rng);
    let mut joined = false;

    let heartbeat_timeout = Duration::from_secs(config.heartbeat_timeout_secs);
    let mut watchdog = tokio::time::interval(Duration::from_secs(5).min(heartbeat_timeout));
    let mut last_seen = Instant::now();

    'read: loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let Some(frame) = frame else { break 'read };
                let Ok(frame) = frame else { break 'read };
                last_seen = Instant::now();
                let text = match frame {
                    Message::Text(t) => t,
                    Message::Close(_) => break 'read,
                    Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => continue,
                };

                let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) else {
                    debug!(player = %my_id, "dropping malformed client message");
                    continue;
                };
                metrics.messages_received_total.fetch_add(1, Ordering::Relaxed);

                match client_msg {
                    ClientMessage::Join { room_id, username } => {
                        if joined {
                            continue;
                        }
                        let name: String = username.chars().take(MAX_USERNAME_LEN).collect();
                        match lobby.join(&room_id, my_id, name, tx.clone()).await {
                            Ok(outcome) => {
                                joined = true;
                                let reply = ServerMessage::JoinOk {
                                    room_id: room_id.clone(),
                                    status: outcome.status.as_wire_str().to_string(),
                                    map: outcome.map,
                                    players: outcome.players,
                                    your_id: my_id,
                                    snapshot: outcome.snapshot,
                                };
                                let _ = tx.send(reply).await;
                            }
                            Err(err) => {
                                let _ = tx.send(ServerMessage::Err { code: err.wire_code().to_string() }).await;
                            }
                        }
                    }
                    ClientMessage::Input { d } => {
                        lobby.input(my_id, &d).await;
                    }
                    ClientMessage::StartRequest {} => {
                        if let Err(err) = lobby.start_request(my_id).await {
                            let _ = tx.send(ServerMessage::Err { code: err.wire_code().to_string() }).await;
                        }
                    }
                    ClientMessage::Exit {} => {
                        lobby.exit(my_id).await;
                        joined = false;
                    }
                    ClientMessage::RoomStatsReq {} => {
                        let rooms = lobby.room_stats().await;
                        let _ = tx.send(ServerMessage::RoomStats { rooms }).await;
                    }
                }
            }
            _ = watchdog.tick() => {
                if last_seen.elapsed() > heartbeat_timeout {
                    warn!(player = %my_id, "heartbeat timeout, closing connection");
                    metrics.heartbeat_timeouts_total.fetch_add(1, Ordering::Relaxed);
                    break 'read;
                }
            }
        }
    }

    if joined {
        lobby.exit(my_id).await;
    }
    send_task.abort();
    metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
}
