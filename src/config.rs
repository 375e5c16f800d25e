use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            client_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Absent means in-memory storage
    pub database_url: Option<String>,
    /// Absent means any origin is accepted
    pub cors_origin: Option<String>,
    pub ws: WsConfig,
    /// Refuse direct routing between users who are not friends
    pub require_friendship: bool,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            database_url: None,
            cors_origin: None,
            ws: WsConfig::default(),
            require_friendship: false,
            log_format: LogFormat::Text,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let defaults = Self::default();

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| crate::error::AppError::Config(format!("PORT is not a port: {raw}")))?,
            Err(_) => defaults.port,
        };

        let database_url = env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let cors_origin = env::var("CORS_ORIGIN")
            .ok()
            .filter(|origin| !origin.trim().is_empty());

        let ws = WsConfig {
            heartbeat_interval: env_secs(
                "WS_HEARTBEAT_INTERVAL_SECS",
                defaults.ws.heartbeat_interval,
            ),
            client_timeout: env_secs("WS_CLIENT_TIMEOUT_SECS", defaults.ws.client_timeout),
        };
        if ws.client_timeout <= ws.heartbeat_interval {
            return Err(crate::error::AppError::Config(
                "WS_CLIENT_TIMEOUT_SECS must exceed WS_HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        let require_friendship = env::var("REQUIRE_FRIENDSHIP")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let log_format = match env::var("LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            port,
            database_url,
            cors_origin,
            ws,
            require_friendship,
            log_format,
        })
    }
}
