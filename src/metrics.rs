//! Prometheus-compatible metrics endpoint.
//!
//! Exposes server metrics in Prometheus format for Grafana dashboards.
//! - /metrics: Prometheus format for scraping
//! - /json: simple JSON format for direct API access
//! - /health: health check endpoint

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Metrics registry for the game server.
#[derive(Debug)]
pub struct Metrics {
    // Room counts by status.
    pub rooms_idle: AtomicU64,
    pub rooms_waiting: AtomicU64,
    pub rooms_running: AtomicU64,
    pub rooms_finished: AtomicU64,

    // Player counts.
    pub human_players: AtomicU64,
    pub bot_players_resident: AtomicU64,
    pub bot_players_benched: AtomicU64,
    pub alive_players: AtomicU64,

    // Tick timing (microseconds), sampled across all rooms each scheduler pass.
    pub tick_time_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,
    pub tick_overruns_total: AtomicU64,

    // Connection / message counters.
    pub connections_active: AtomicU64,
    pub connections_total: AtomicU64,
    pub messages_received_total: AtomicU64,
    pub messages_sent_total: AtomicU64,
    pub heartbeat_timeouts_total: AtomicU64,

    // Room lifecycle counters.
    pub rounds_started_total: AtomicU64,
    pub rounds_finished_total: AtomicU64,
    pub deaths_wall_total: AtomicU64,
    pub deaths_body_total: AtomicU64,
    pub deaths_head_on_total: AtomicU64,
    pub deaths_disconnect_total: AtomicU64,
    pub bot_revivals_total: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            rooms_idle: AtomicU64::new(0),
            rooms_waiting: AtomicU64::new(0),
            rooms_running: AtomicU64::new(0),
            rooms_finished: AtomicU64::new(0),
            human_players: AtomicU64::new(0),
            bot_players_resident: AtomicU64::new(0),
            bot_players_benched: AtomicU64::new(0),
            alive_players: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            tick_overruns_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            messages_received_total: AtomicU64::new(0),
            messages_sent_total: AtomicU64::new(0),
            heartbeat_timeouts_total: AtomicU64::new(0),
            rounds_started_total: AtomicU64::new(0),
            rounds_finished_total: AtomicU64::new(0),
            deaths_wall_total: AtomicU64::new(0),
            deaths_body_total: AtomicU64::new(0),
            deaths_head_on_total: AtomicU64::new(0),
            deaths_disconnect_total: AtomicU64::new(0),
            bot_revivals_total: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Records one tick scheduler pass over every room.
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);
        self.tick_time_max_us.fetch_max(us, Ordering::Relaxed);
    }

    /// Records a death by its wire reason code.
    pub fn record_death(&self, reason: &str) {
        match reason {
            "wall" => self.deaths_wall_total.fetch_add(1, Ordering::Relaxed),
            "body" => self.deaths_body_total.fetch_add(1, Ordering::Relaxed),
            "head-on" => self.deaths_head_on_total.fetch_add(1, Ordering::Relaxed),
            _ => self.deaths_disconnect_total.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generates Prometheus-format metrics output.
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("snake_arena_rooms_idle", "Rooms with no players", "gauge", self.rooms_idle.load(Ordering::Relaxed));
        metric!("snake_arena_rooms_waiting", "Rooms waiting to start", "gauge", self.rooms_waiting.load(Ordering::Relaxed));
        metric!("snake_arena_rooms_running", "Rooms mid-round", "gauge", self.rooms_running.load(Ordering::Relaxed));
        metric!("snake_arena_rooms_finished", "Rooms showing a finished round", "gauge", self.rooms_finished.load(Ordering::Relaxed));

        metric!("snake_arena_players_human", "Connected human players", "gauge", self.human_players.load(Ordering::Relaxed));
        metric!("snake_arena_players_bot_resident", "Unbenched bots", "gauge", self.bot_players_resident.load(Ordering::Relaxed));
        metric!("snake_arena_players_bot_benched", "Benched bots", "gauge", self.bot_players_benched.load(Ordering::Relaxed));
        metric!("snake_arena_players_alive", "Players with a live snake", "gauge", self.alive_players.load(Ordering::Relaxed));

        metric!("snake_arena_tick_time_microseconds", "Last tick scheduler pass duration", "gauge", self.tick_time_us.load(Ordering::Relaxed));
        metric!("snake_arena_tick_time_max_microseconds", "Maximum tick scheduler pass duration", "gauge", self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("snake_arena_tick_count", "Total tick scheduler passes", "counter", self.tick_count.load(Ordering::Relaxed));
        metric!("snake_arena_tick_overruns_total", "Ticks that ran past their period", "counter", self.tick_overruns_total.load(Ordering::Relaxed));

        metric!("snake_arena_connections_active", "Active websocket connections", "gauge", self.connections_active.load(Ordering::Relaxed));
        metric!("snake_arena_connections_total", "Total websocket connections accepted", "counter", self.connections_total.load(Ordering::Relaxed));
        metric!("snake_arena_messages_received_total", "Client messages received", "counter", self.messages_received_total.load(Ordering::Relaxed));
        metric!("snake_arena_messages_sent_total", "Server messages sent", "counter", self.messages_sent_total.load(Ordering::Relaxed));
        metric!("snake_arena_heartbeat_timeouts_total", "Connections closed for heartbeat timeout", "counter", self.heartbeat_timeouts_total.load(Ordering::Relaxed));

        metric!("snake_arena_rounds_started_total", "Rounds started", "counter", self.rounds_started_total.load(Ordering::Relaxed));
        metric!("snake_arena_rounds_finished_total", "Rounds finished", "counter", self.rounds_finished_total.load(Ordering::Relaxed));
        metric!("snake_arena_deaths_wall_total", "Deaths by wall collision", "counter", self.deaths_wall_total.load(Ordering::Relaxed));
        metric!("snake_arena_deaths_body_total", "Deaths by body collision", "counter", self.deaths_body_total.load(Ordering::Relaxed));
        metric!("snake_arena_deaths_head_on_total", "Deaths by head-on collision", "counter", self.deaths_head_on_total.load(Ordering::Relaxed));
        metric!("snake_arena_deaths_disconnect_total", "Deaths by disconnect", "counter", self.deaths_disconnect_total.load(Ordering::Relaxed));
        metric!("snake_arena_bot_revivals_total", "Benched bots revived mid-round", "counter", self.bot_revivals_total.load(Ordering::Relaxed));

        metric!("snake_arena_uptime_seconds", "Server uptime in seconds", "counter", self.uptime_seconds());

        output
    }

    /// Generates a simple JSON format (alternative for direct API access).
    pub fn to_json(&self) -> String {
        format!(
            r#"{{
  "rooms": {{
    "idle": {},
    "waiting": {},
    "running": {},
    "finished": {}
  }},
  "players": {{
    "human": {},
    "bot_resident": {},
    "bot_benched": {},
    "alive": {}
  }},
  "tick": {{
    "time_us": {},
    "max_us": {},
    "count": {},
    "overruns_total": {}
  }},
  "network": {{
    "connections_active": {},
    "connections_total": {},
    "messages_received_total": {},
    "messages_sent_total": {},
    "heartbeat_timeouts_total": {}
  }},
  "rounds": {{
    "started_total": {},
    "finished_total": {},
    "bot_revivals_total": {}
  }},
  "uptime_seconds": {}
}}"#,
            self.rooms_idle.load(Ordering::Relaxed),
            self.rooms_waiting.load(Ordering::Relaxed),
            self.rooms_running.load(Ordering::Relaxed),
            self.rooms_finished.load(Ordering::Relaxed),
            self.human_players.load(Ordering::Relaxed),
            self.bot_players_resident.load(Ordering::Relaxed),
            self.bot_players_benched.load(Ordering::Relaxed),
            self.alive_players.load(Ordering::Relaxed),
            self.tick_time_us.load(Ordering::Relaxed),
            self.tick_time_max_us.load(Ordering::Relaxed),
            self.tick_count.load(Ordering::Relaxed),
            self.tick_overruns_total.load(Ordering::Relaxed),
            self.connections_active.load(Ordering::Relaxed),
            self.connections_total.load(Ordering::Relaxed),
            self.messages_received_total.load(Ordering::Relaxed),
            self.messages_sent_total.load(Ordering::Relaxed),
            self.heartbeat_timeouts_total.load(Ordering::Relaxed),
            self.rounds_started_total.load(Ordering::Relaxed),
            self.rounds_finished_total.load(Ordering::Relaxed),
            self.bot_revivals_total.load(Ordering::Relaxed),
            self.uptime_seconds(),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts the metrics HTTP server. A bare hand-rolled responder is enough
/// here: three fixed routes, no content negotiation, no keep-alive.
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    let response = if request.starts_with("GET /metrics") {
                        let body = metrics.to_prometheus();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /json") {
                        let body = metrics.to_json();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /health") || request.starts_with("GET /") {
                        let body = "OK";
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.human_players.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();
        for i in 0..10 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 10);
        assert!(metrics.tick_time_max_us.load(Ordering::Relaxed) >= 190);
    }

    #[test]
    fn test_record_death_buckets_by_reason() {
        let metrics = Metrics::new();
        metrics.record_death("wall");
        metrics.record_death("body");
        metrics.record_death("head-on");
        metrics.record_death("disconnect");
        assert_eq!(metrics.deaths_wall_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.deaths_body_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.deaths_head_on_total.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.deaths_disconnect_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.human_players.store(5, Ordering::Relaxed);
        metrics.bot_players_resident.store(3, Ordering::Relaxed);

        let output = metrics.to_prometheus();

        assert!(output.contains("snake_arena_players_human 5"));
        assert!(output.contains("snake_arena_players_bot_resident 3"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.human_players.store(7, Ordering::Relaxed);

        let output = metrics.to_json();

        assert!(output.contains("\"human\": 7"));
        assert!(output.contains("\"players\":"));
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        std::thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime_seconds() < 60);
    }
}
