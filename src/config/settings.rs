//! Application settings and configuration structures.

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use rand::distr::{Alphanumeric, SampleString};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// Access/refresh token settings
    pub jwt: JwtSettings,

    /// Sliding-window rate limiting
    pub rate_limit: RateLimitSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// WebSocket gateway configuration
    pub websocket: WebSocketSettings,

    /// Binary-object host used for attachments
    pub media: MediaSettings,

    /// Refresh cookie attributes
    pub cookie: CookieSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,
}

/// Token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for signing access tokens
    pub secret: String,

    /// Access token lifetime in seconds
    pub access_token_ttl_seconds: i64,

    /// Refresh token lifetime in seconds
    pub refresh_token_ttl_seconds: i64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    /// Sliding window length in seconds
    pub window_seconds: u64,

    /// Auth attempts (register/login/refresh) per client address per window
    pub max_auth: usize,

    /// Message sends and uploads per user per window
    pub max_send: usize,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum inbound message size in bytes (default: 64KB)
    pub max_message_size: usize,

    /// Seconds between server pings (default: 20)
    pub heartbeat_interval_secs: u64,

    /// Seconds without a pong before the connection is closed (default: 45)
    pub heartbeat_timeout_secs: u64,

    /// Upper bound on messages replayed after a reconnect (default: 500)
    pub replay_limit: i64,
}

/// Media host configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    /// Upload endpoint of the object host; uploads are refused when unset
    pub upload_url: Option<String>,

    /// Bearer credential for the object host
    pub api_key: Option<String>,

    /// Maximum accepted upload in megabytes
    pub max_upload_mb: usize,
}

/// Refresh cookie configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieSettings {
    /// Emit the `Secure` attribute
    pub secure: bool,
}

/// Minimum accepted length for a configured JWT secret
pub const MIN_JWT_SECRET_LENGTH: usize = 16;

/// Length of the secret generated when none is configured
const EPHEMERAL_SECRET_LENGTH: usize = 64;

/// Access tokens cannot be revoked, so they live briefly.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;

/// Refresh tokens carry the long-lived session.
pub const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 60 * 60 * 24 * 120;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// A missing JWT secret is replaced by a random per-process secret, which
    /// invalidates every access token on restart. A configured secret shorter
    /// than [`MIN_JWT_SECRET_LENGTH`] is rejected.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        let settings: Self = Self::defaults(&environment)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__SERVER__PORT=8000 -> server.port = 8000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option("media.upload_url", std::env::var("MEDIA_UPLOAD_URL").ok())?
            .set_override_option("media.api_key", std::env::var("MEDIA_API_KEY").ok())?
            .build()?
            .try_deserialize()?;

        let cors_env = std::env::var("CORS_ORIGINS").ok();
        settings.finalize(cors_env.as_deref())
    }

    /// Built-in defaults, the lowest configuration layer.
    fn defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("environment", environment)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("jwt.secret", "")?
            .set_default("jwt.access_token_ttl_seconds", DEFAULT_ACCESS_TOKEN_TTL_SECONDS)?
            .set_default("jwt.refresh_token_ttl_seconds", DEFAULT_REFRESH_TOKEN_TTL_SECONDS)?
            .set_default("rate_limit.window_seconds", 60)?
            .set_default("rate_limit.max_auth", 20)?
            .set_default("rate_limit.max_send", 100)?
            .set_default("cors.allowed_origins", vec!["http://localhost"])?
            .set_default("websocket.max_message_size", 65536_i64)?
            .set_default("websocket.heartbeat_interval_secs", 20)?
            .set_default("websocket.heartbeat_timeout_secs", 45)?
            .set_default("websocket.replay_limit", 500)?
            .set_default("media.max_upload_mb", 25)?
            .set_default("cookie.secure", true)
    }

    /// Apply the post-load rules shared by every configuration source.
    pub fn finalize(mut self, cors_origins: Option<&str>) -> Result<Self, ConfigError> {
        self.jwt.secret = self.jwt.secret.trim().to_string();
        if self.jwt.secret.is_empty() {
            tracing::warn!(
                "JWT secret is not configured; generated an ephemeral secret, \
                 access tokens will not survive a restart"
            );
            self.jwt.secret = Alphanumeric.sample_string(&mut rand::rng(), EPHEMERAL_SECRET_LENGTH);
        }
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "JWT secret must be at least {} characters. Current length: {}",
                MIN_JWT_SECRET_LENGTH,
                self.jwt.secret.len()
            )));
        }

        if let Some(raw) = cors_origins {
            self.cors.allowed_origins = parse_cors_origins(raw);
        }

        if self.database.url.starts_with("postgres://") {
            self.database.url = format!("postgresql://{}", &self.database.url["postgres://".len()..]);
        }

        Ok(self)
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Split a comma-separated origin list, dropping blanks and duplicates while
/// keeping first-seen order. An empty list falls back to `http://localhost`.
pub fn parse_cors_origins(raw: &str) -> Vec<String> {
    let mut origins: Vec<String> = Vec::new();
    for origin in raw.split(',').map(str::trim).filter(|o| !o.is_empty()) {
        if !origins.iter().any(|o| o == origin) {
            origins.push(origin.to_string());
        }
    }
    if origins.is_empty() {
        origins.push("http://localhost".to_string());
    }
    origins
}

impl RateLimitSettings {
    pub fn window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.window_seconds)
    }
}

impl WebSocketSettings {
    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

impl MediaSettings {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

#[cfg(test)]
pub fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseSettings {
            url: "postgresql://localhost/test".into(),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: 1,
        },
        jwt: JwtSettings {
            secret: "test-secret-0123456789abcdef".into(),
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 86400,
        },
        rate_limit: RateLimitSettings {
            window_seconds: 60,
            max_auth: 20,
            max_send: 100,
        },
        cors: CorsSettings {
            allowed_origins: vec!["http://localhost".into()],
        },
        websocket: WebSocketSettings {
            max_message_size: 65536,
            heartbeat_interval_secs: 20,
            heartbeat_timeout_secs: 45,
            replay_limit: 500,
        },
        media: MediaSettings {
            upload_url: None,
            api_key: None,
            max_upload_mb: 25,
        },
        cookie: CookieSettings { secure: true },
        environment: "test".into(),
    }
}
