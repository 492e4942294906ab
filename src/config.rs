use std::net::IpAddr;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: IpAddr,
    /// Port to listen on.
    pub port: u16,
    /// Number of rooms created at startup (`room-1` .. `room-N`).
    pub room_count: usize,
    /// Capacity of each room (counted players: humans plus the one unbenched bot).
    pub room_capacity: usize,
    /// Map width in cells.
    pub map_width: u16,
    /// Map height in cells.
    pub map_height: u16,
    /// Simulation tick rate in Hz.
    pub tick_hz: u32,
    /// Target number of food cells kept on the map at once.
    pub food_target: usize,
    /// Auto-start countdown once a room has two or more counted players.
    pub countdown_secs: u64,
    /// Websocket ping interval.
    pub heartbeat_interval_secs: u64,
    /// Websocket ping timeout before a connection is considered dead.
    pub heartbeat_timeout_secs: u64,
    /// Bots resident in each room at startup (one stays unbenched once a
    /// human joins; the rest wait benched for an AI-showdown handoff).
    pub bots_per_room: usize,
    /// Outbound queue depth for a connection's broadcast fan-out before a
    /// send is treated as backpressure and the connection is left for dead.
    pub outbound_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".parse().unwrap(),
            port: 8765,
            room_count: 20,
            room_capacity: 10,
            map_width: 50,
            map_height: 50,
            tick_hz: 15,
            food_target: 3,
            countdown_secs: 5,
            heartbeat_interval_secs: 20,
            heartbeat_timeout_secs: 60,
            bots_per_room: 2,
            outbound_queue_capacity: 64,
        }
    }
}

impl ServerConfig {
    /// Loads config from environment variables, falling back to defaults for
    /// anything unset or unparseable.
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(parsed) = port.parse() {
                config.port = parsed;
            }
        }

        if let Ok(room_count) = std::env::var("ROOM_COUNT") {
            if let Ok(parsed) = room_count.parse() {
                config.room_count = parsed;
            }
        }

        if let Ok(room_capacity) = std::env::var("ROOM_CAPACITY") {
            if let Ok(parsed) = room_capacity.parse() {
                config.room_capacity = parsed;
            }
        }

        if let Ok(map_width) = std::env::var("MAP_WIDTH") {
            if let Ok(parsed) = map_width.parse() {
                config.map_width = parsed;
            }
        }

        if let Ok(map_height) = std::env::var("MAP_HEIGHT") {
            if let Ok(parsed) = map_height.parse() {
                config.map_height = parsed;
            }
        }

        if let Ok(tick_hz) = std::env::var("SIM_TICK_HZ") {
            if let Ok(parsed) = tick_hz.parse() {
                config.tick_hz = parsed;
            }
        }

        if let Ok(food_target) = std::env::var("FOOD_TARGET") {
            if let Ok(parsed) = food_target.parse() {
                config.food_target = parsed;
            }
        }

        if let Ok(countdown) = std::env::var("COUNTDOWN_SECS") {
            if let Ok(parsed) = countdown.parse() {
                config.countdown_secs = parsed;
            }
        }

        if let Ok(bots) = std::env::var("BOTS_PER_ROOM") {
            if let Ok(parsed) = bots.parse() {
                config.bots_per_room = parsed;
            }
        }

        config
    }

    /// Wall-clock period of one simulation tick.
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.tick_hz as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8765);
        assert_eq!(config.room_count, 20);
        assert_eq!(config.room_capacity, 10);
        assert_eq!(config.map_width, 50);
        assert_eq!(config.tick_hz, 15);
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.port > 0);
    }

    #[test]
    fn test_tick_period() {
        let config = ServerConfig::default();
        let period = config.tick_period();
        assert!((period.as_secs_f64() - 1.0 / 15.0).abs() < 1e-9);
    }
}
