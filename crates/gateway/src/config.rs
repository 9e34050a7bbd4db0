//! Environment-driven configuration.

use std::env;
use std::time::Duration;

/// Gateway configuration, read once at startup.
///
/// The lock TTL must exceed the expected critical-section duration with
/// margin; nothing at runtime defends against a lock expiring mid-section.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub metrics_port: u16,
    pub redis_url: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub session_ttl: Duration,
    pub starting_balance: f64,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            metrics_port: 9090,
            redis_url: "redis://localhost:6379".to_string(),
            database_url: "postgres://localhost/game".to_string(),
            jwt_secret: "change-me".to_string(),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            starting_balance: 1000.0,
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            metrics_port: parse_var("METRICS_PORT", defaults.metrics_port),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            jwt_secret: env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            session_ttl: Duration::from_secs(parse_var(
                "SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )),
            starting_balance: parse_var("STARTING_BALANCE", defaults.starting_balance),
            ping_interval: Duration::from_secs(parse_var(
                "PING_INTERVAL_SECS",
                defaults.ping_interval.as_secs(),
            )),
            pong_timeout: Duration::from_secs(parse_var(
                "PONG_TIMEOUT_SECS",
                defaults.pong_timeout.as_secs(),
            )),
            request_timeout: Duration::from_secs(parse_var(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{} must be a valid {}", name, std::any::type_name::<T>())),
        Err(_) => default,
    }
}
