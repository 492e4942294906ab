//! The axum router (one `/ws` upgrade route) and the global tick scheduler
//! that drives every room forward at a fixed cadence.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::lobby::manager::LobbyManager;
use crate::metrics::Metrics;
use crate::net::connection::handle_socket;
use crate::net::protocol::ServerMessage;

#[derive(Clone)]
pub struct AppState {
    pub lobby: Arc<LobbyManager>,
    pub config: Arc<ServerConfig>,
    pub metrics: Arc<Metrics>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    Router::new().route("/ws", get(ws_upgrade)).layer(cors).with_state(state)
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.lobby, state.config, state.metrics))
}

/// Runs forever, ticking every room once per `config.tick_period()`. Each
/// iteration takes at most one room's lock at a time; a slow room delays
/// only its own players, not the rest of the fleet. If a tick overruns the
/// period, the next sleep is simply zero — no catch-up bursts.
pub async fn run_tick_scheduler(
    lobby: Arc<LobbyManager>,
    config: Arc<ServerConfig>,
    metrics: Arc<Metrics>,
) {
    let period = config.tick_period();
    let mut next_tick = Instant::now() + period;
    loop {
        let pass_start = Instant::now();
        for room in lobby.rooms() {
            let mut locked = room.lock().await;
            if let Some(start_msg) = locked.try_autostart(pass_start) {
                metrics.rounds_started_total.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                locked.broadcast(&start_msg);
                continue;
            }
            if let Some(outcome) = locked.tick() {
                if let Some(delta) = &outcome.delta {
                    record_delta_metrics(&metrics, delta);
                    locked.broadcast(delta);
                }
                if let Some(game_over) = outcome.game_over {
                    metrics.rounds_finished_total.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    locked.broadcast(&game_over);
                }
            }
        }
        metrics.record_tick_time(pass_start.elapsed());

        let now = Instant::now();
        if next_tick > now {
            tokio::time::sleep(next_tick - now).await;
        } else {
            metrics.tick_overruns_total.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            warn!(overrun_us = (now - next_tick).as_micros(), "tick scheduler fell behind");
        }
        next_tick += period;
        if next_tick < Instant::now() {
            next_tick = Instant::now();
        }
    }
}

/// Buckets each move in a delta message into the death/revival counters.
/// Reads the moves the tick already produced rather than threading `Metrics`
/// through `Room`, keeping the engine's unit tests metrics-free.
fn record_delta_metrics(metrics: &Metrics, delta: &ServerMessage) {
    let ServerMessage::Delta { moves, .. } = delta else { return };
    for mv in moves {
        if mv.dead == Some(true) {
            metrics.record_death(mv.reason.as_deref().unwrap_or("disconnect"));
        }
        if mv.revived == Some(true) {
            metrics.bot_revivals_total.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }
}

pub async fn serve(app: Router, config: &ServerConfig) -> std::io::Result<()> {
    let addr = std::net::SocketAddr::new(config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).await
}
