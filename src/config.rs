use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub bot: BotConfig,
    pub admin: AdminConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    /// Port for the mini-app server (static game page).
    pub game_port: u16,
    /// Port for the admin dashboard; kept on its own listener so it can be
    /// firewalled off separately from the public mini-app.
    pub admin_port: u16,
    /// Externally reachable base URL the Telegram client opens the mini-app
    /// from. The bot appends `/game` when building web-app buttons.
    pub web_app_url: String,
    /// URL the bot hands to the administrator on `/admin`.
    pub admin_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub token: String,
    /// Telegram id allowed to request the admin panel link. Externally
    /// supplied rather than hardcoded so it can be rotated without a rebuild.
    pub admin_user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Shared dashboard password. Required, no fallback.
    pub password: String,
    /// HS256 secret for the session cookie.
    pub session_secret: String,
    pub session_ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for the admin surface.
    pub admin_per_second: u32,
    /// Burst size for the admin surface.
    pub admin_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                game_port: env::var("GAME_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("GAME_PORT".to_string()))?,
                admin_port: env::var("ADMIN_PORT")
                    .unwrap_or_else(|_| "3001".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("ADMIN_PORT".to_string()))?,
                web_app_url: env::var("WEB_APP_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                admin_url: env::var("ADMIN_URL")
                    .unwrap_or_else(|_| "http://localhost:3001/admin".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/growspark.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            bot: BotConfig {
                token: env::var("BOT_TOKEN")
                    .map_err(|_| ConfigError::MissingEnv("BOT_TOKEN".to_string()))?,
                admin_user_id: env::var("ADMIN_TELEGRAM_ID")
                    .map_err(|_| ConfigError::MissingEnv("ADMIN_TELEGRAM_ID".to_string()))?
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("ADMIN_TELEGRAM_ID".to_string()))?,
            },
            admin: AdminConfig {
                password: env::var("ADMIN_PASSWORD")
                    .map_err(|_| ConfigError::MissingEnv("ADMIN_PASSWORD".to_string()))?,
                session_secret: env::var("ADMIN_SESSION_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("ADMIN_SESSION_SECRET".to_string()))?,
                session_ttl_hours: env::var("ADMIN_SESSION_TTL_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .unwrap_or(24),
            },
            rate_limit: RateLimitConfig {
                admin_per_second: env::var("RATE_LIMIT_ADMIN_PER_SECOND")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                admin_burst: env::var("RATE_LIMIT_ADMIN_BURST")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                game_port: 3000,
                admin_port: 3001,
                web_app_url: "http://localhost:3000".to_string(),
                admin_url: "http://localhost:3001/admin".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/growspark.db".to_string(),
                max_connections: 5,
            },
            bot: BotConfig {
                token: String::new(),
                admin_user_id: 0,
            },
            admin: AdminConfig {
                password: String::new(),
                session_secret: String::new(),
                session_ttl_hours: 24,
            },
            rate_limit: RateLimitConfig {
                admin_per_second: 5,
                admin_burst: 20,
            },
        }
    }
}
