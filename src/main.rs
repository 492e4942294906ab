mod config;
mod error;
mod game;
mod id;
mod lobby;
mod metrics;
mod net;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, Level};

use crate::config::ServerConfig;
use crate::game::policy::HoldDirectionPolicy;
use crate::lobby::manager::LobbyManager;
use crate::metrics::Metrics;
use crate::net::server::{build_router, run_tick_scheduler, serve, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt().with_max_level(Level::INFO).with_target(false).init();

    info!("Snake Arena Server v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(ServerConfig::load_or_default());
    info!(
        "Configuration loaded: {}:{}, room_count={}, room_capacity={}",
        config.bind_address, config.port, config.room_count, config.room_capacity
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_port: u16 =
        std::env::var("METRICS_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(9090);
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    // TODO: wire a trained policy checkpoint in once one exists; falls back
    // to holding direction, which still produces a legal (if dull) bot.
    let policy: Arc<dyn crate::game::policy::BotPolicy> = Arc::new(HoldDirectionPolicy);
    let lobby = Arc::new(LobbyManager::new(&config, policy));

    tokio::spawn(sample_metrics(lobby.clone(), metrics.clone()));
    tokio::spawn(run_tick_scheduler(lobby.clone(), config.clone(), metrics.clone()));

    let app = build_router(AppState { lobby: lobby.clone(), config: config.clone(), metrics: metrics.clone() });

    let shutdown = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = serve(app, &config) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Periodically recomputes the room/player gauges from each room's public
/// stats snapshot, since the tick scheduler only broadcasts deltas and
/// doesn't otherwise touch the metrics registry.
async fn sample_metrics(lobby: Arc<LobbyManager>, metrics: Arc<Metrics>) {
    let mut interval = tokio::time::interval(Duration::from_secs(2));
    loop {
        interval.tick().await;
        let stats = lobby.room_stats().await;
        let (alive, benched) = lobby.live_counts().await;
        metrics.alive_players.store(alive, std::sync::atomic::Ordering::Relaxed);
        metrics.bot_players_benched.store(benched, std::sync::atomic::Ordering::Relaxed);

        let (mut idle, mut waiting, mut running, mut finished) = (0u64, 0u64, 0u64, 0u64);
        let (mut humans, mut bots_resident) = (0u64, 0u64);
        for room in &stats {
            match room.status.as_str() {
                "idle" => idle += 1,
                "waiting" => waiting += 1,
                "running" => running += 1,
                "finished" => finished += 1,
                _ => {}
            }
            humans += room.connected_players as u64;
            bots_resident += room.used_slots.saturating_sub(room.connected_players) as u64;
        }

        metrics.rooms_idle.store(idle, std::sync::atomic::Ordering::Relaxed);
        metrics.rooms_waiting.store(waiting, std::sync::atomic::Ordering::Relaxed);
        metrics.rooms_running.store(running, std::sync::atomic::Ordering::Relaxed);
        metrics.rooms_finished.store(finished, std::sync::atomic::Ordering::Relaxed);
        metrics.human_players.store(humans, std::sync::atomic::Ordering::Relaxed);
        metrics.bot_players_resident.store(bots_resident, std::sync::atomic::Ordering::Relaxed);
    }
}
