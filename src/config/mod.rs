//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::physics::MovementPolicy;
use crate::game::scheduler::MAX_TICK_RATE;
use crate::game::WorldConfig;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// HMAC secret used to verify session tokens
    pub auth_token_secret: String,
    /// Allowed client origins for CORS (comma-separated, empty = permissive)
    pub client_origin: Option<String>,

    /// Movement policy selected for this deployment
    pub policy: MovementPolicy,
    /// World geometry and tick rate
    pub world: WorldConfig,
    /// Grid move duration at multiplier 1.0
    pub base_tile_duration_ms: f64,
    /// Delta clamp for the continuous policy
    pub max_delta_ms: f64,
    /// Speed multiplier bounds
    pub speed_min: f64,
    pub speed_max: f64,
    /// Accepted player ids, the first one drives the entity
    pub players: Vec<String>,
    /// Start the tick loop at boot
    pub auto_start: bool,

    /// PostgREST endpoint for chat persistence (in-memory when unset)
    pub chat_store_url: Option<String>,
    /// API key for the chat store
    pub chat_store_key: Option<String>,
    /// Messages replayed to a new connection
    pub chat_history_limit: usize,
    /// Bound on a single chat persistence call
    pub chat_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:9001".to_string())
        };

        let policy: MovementPolicy = parse_or("MOVEMENT_POLICY", MovementPolicy::Grid)?;
        let defaults = WorldConfig::defaults_for(policy);

        let world = WorldConfig {
            width: parse_or("WORLD_WIDTH", defaults.width)?,
            height: parse_or("WORLD_HEIGHT", defaults.height)?,
            grid_size: parse_or("GRID_SIZE", defaults.grid_size)?,
            canvas_width: parse_or("CANVAS_WIDTH", defaults.canvas_width)?,
            canvas_height: parse_or("CANVAS_HEIGHT", defaults.canvas_height)?,
            tick_rate: parse_or("TICK_RATE", defaults.tick_rate)?,
        };

        let players: Vec<String> = env::var("PLAYERS")
            .unwrap_or_else(|_| "player1".to_string())
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if players.is_empty() {
            return Err(ConfigError::Invalid("PLAYERS"));
        }

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            auth_token_secret: env::var("AUTH_TOKEN_SECRET")
                .map_err(|_| ConfigError::Missing("AUTH_TOKEN_SECRET"))?,
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),

            policy,
            world,
            base_tile_duration_ms: parse_or("BASE_TILE_DURATION_MS", 250.0)?,
            max_delta_ms: parse_or("MAX_DELTA_MS", 100.0)?,
            speed_min: parse_or("SPEED_MIN", 0.1)?,
            speed_max: parse_or("SPEED_MAX", 5.0)?,
            players,
            auto_start: parse_or("AUTO_START", true)?,

            chat_store_url: env::var("CHAT_STORE_URL").ok().filter(|s| !s.is_empty()),
            chat_store_key: env::var("CHAT_STORE_KEY").ok(),
            chat_history_limit: parse_or("CHAT_HISTORY_LIMIT", 5)?,
            chat_timeout_ms: parse_or("CHAT_TIMEOUT_MS", 2000)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or crash the engine at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.world.tick_rate;
        if !(rate.is_finite() && rate > 0.0 && rate <= MAX_TICK_RATE) {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }

        let world = &self.world;
        if !(world.grid_size > 0.0 && world.width >= world.grid_size && world.height >= world.grid_size)
        {
            return Err(ConfigError::Invalid("WORLD_WIDTH/WORLD_HEIGHT/GRID_SIZE"));
        }

        if !positive(self.base_tile_duration_ms) {
            return Err(ConfigError::Invalid("BASE_TILE_DURATION_MS"));
        }
        if !positive(self.max_delta_ms) {
            return Err(ConfigError::Invalid("MAX_DELTA_MS"));
        }

        if !(positive(self.speed_min) && self.speed_max.is_finite() && self.speed_min <= self.speed_max) {
            return Err(ConfigError::Invalid("SPEED_MIN/SPEED_MAX"));
        }
        Ok(())
    }

    /// The player whose input drives the entity
    pub fn controller(&self) -> &str {
        &self.players[0]
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Parse an optional variable, falling back to a default when unset
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
impl Config {
    /// Configuration used by unit tests, never read from the environment
    pub fn for_tests(policy: MovementPolicy) -> Self {
        Self {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            auth_token_secret: "test-secret".to_string(),
            client_origin: None,
            policy,
            world: WorldConfig::defaults_for(policy),
            base_tile_duration_ms: 250.0,
            max_delta_ms: 100.0,
            speed_min: 0.1,
            speed_max: 5.0,
            players: vec!["player1".to_string()],
            auto_start: false,
            chat_store_url: None,
            chat_store_key: None,
            chat_history_limit: 5,
            chat_timeout_ms: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_key(config: &Config) -> Option<&'static str> {
        match config.validate() {
            Err(ConfigError::Invalid(key)) => Some(key),
            _ => None,
        }
    }

    #[test]
    fn defaults_are_valid() {
        tokio_test::assert_ok!(Config::for_tests(MovementPolicy::Grid).validate());
        tokio_test::assert_ok!(Config::for_tests(MovementPolicy::Continuous).validate());
    }

    #[test]
    fn rejects_tick_rates_without_a_usable_period() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e10] {
            let mut config = Config::for_tests(MovementPolicy::Grid);
            config.world.tick_rate = rate;
            assert_eq!(invalid_key(&config), Some("TICK_RATE"), "rate {rate}");
        }
    }

    #[test]
    fn rejects_non_positive_durations() {
        for value in [0.0, -250.0, f64::NAN] {
            let mut config = Config::for_tests(MovementPolicy::Grid);
            config.base_tile_duration_ms = value;
            assert_eq!(invalid_key(&config), Some("BASE_TILE_DURATION_MS"));

            let mut config = Config::for_tests(MovementPolicy::Continuous);
            config.max_delta_ms = value;
            assert_eq!(invalid_key(&config), Some("MAX_DELTA_MS"));
        }
    }

    #[test]
    fn rejects_inverted_speed_bounds() {
        let mut config = Config::for_tests(MovementPolicy::Grid);
        config.speed_min = 3.0;
        config.speed_max = 2.0;
        assert_eq!(invalid_key(&config), Some("SPEED_MIN/SPEED_MAX"));
    }
}
