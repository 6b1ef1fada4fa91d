//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Storage backend and PostgreSQL pool configuration
    pub database: DatabaseSettings,

    /// JWT authentication settings
    pub jwt: JwtSettings,

    /// Snowflake ID generator settings
    pub snowflake: SnowflakeSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// Real-time gateway configuration
    pub websocket: WebSocketSettings,

    /// Message pipeline limits and paging defaults
    pub messaging: MessagingSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Which store backs the repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local tables; state is lost on restart
    #[default]
    Memory,
    Postgres,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub backend: StorageBackend,

    /// Database connection URL (required for the postgres backend)
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,
}

/// JWT authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for signing tokens
    pub secret: String,

    /// Access token expiry in minutes
    pub access_token_expiry_minutes: i64,
}

/// Snowflake ID generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Machine/worker ID (0-1023)
    pub machine_id: u16,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins; `*` allows any
    pub allowed_origins: Vec<String>,
}

/// Gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum inbound message size in bytes
    pub max_message_size: usize,
}

/// Limits applied by the message pipeline and list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingSettings {
    /// Maximum message length in characters, after trimming
    pub max_content_length: usize,

    /// Characters kept in a private message notification preview
    pub preview_length: usize,

    pub default_page_size: i64,

    pub max_page_size: i64,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            max_content_length: 1000,
            preview_length: 50,
            default_page_size: 50,
            max_page_size: 100,
        }
    }
}

/// Minimum required length for JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. built-in defaults
    /// 2. config/default.toml
    /// 3. config/{RUN_ENV}.toml
    /// 4. `APP__…` environment variables, then the plain overrides
    ///    (`DATABASE_URL`, `JWT_SECRET`, `SERVER_PORT`, …)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// if the JWT secret is too short, or if the postgres backend is selected
    /// without a URL.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.backend", "memory")?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("jwt.access_token_expiry_minutes", 60 * 24)?
            .set_default("snowflake.machine_id", 1)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            .set_default("websocket.max_message_size", 65536_i64)?
            .set_default("messaging.max_content_length", 1000_i64)?
            .set_default("messaging.preview_length", 50_i64)?
            .set_default("messaging.default_page_size", 50_i64)?
            .set_default("messaging.max_page_size", 100_i64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__SERVER__PORT=3000 -> server.port = 3000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("database.backend", std::env::var("STORAGE_BACKEND").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option(
                "snowflake.machine_id",
                std::env::var("SNOWFLAKE_MACHINE_ID").ok(),
            )?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| settings.validate().map(|()| settings))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "JWT secret must be at least {} characters. Current length: {}",
                MIN_JWT_SECRET_LENGTH,
                self.jwt.secret.len()
            )));
        }
        if self.database.backend == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err(ConfigError::Message(
                "database.url is required when database.backend = \"postgres\"".into(),
            ));
        }
        if self.snowflake.machine_id > 1023 {
            return Err(ConfigError::Message(format!(
                "snowflake.machine_id must be within 0..=1023, got {}",
                self.snowflake.machine_id
            )));
        }
        Ok(())
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
