use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_OUTBOX_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_OUTBOX_BATCH_SIZE: u64 = 50;
const DEFAULT_REALTIME_CHANNEL_CAPACITY: usize = 256;
const DEV_DEFAULT_JWT_SECRET: &str =
    "pharmaflow_development_secret_key_that_is_at_least_64_characters_long_ok";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret shared with the identity provider (minimum 32 characters)
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Expected `iss` claim
    pub jwt_issuer: String,

    /// Expected `aud` claim
    pub jwt_audience: String,

    /// Lifetime of tokens minted by [`crate::auth::AuthService::issue_token`]
    pub jwt_expiration: usize,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Per-request timeout for HTTP handlers
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// How often the outbox dispatcher polls when it is not nudged
    #[serde(default = "default_outbox_poll_interval_ms")]
    pub outbox_poll_interval_ms: u64,

    /// Maximum rows claimed per dispatcher pass
    #[serde(default = "default_outbox_batch_size")]
    pub outbox_batch_size: u64,

    /// Buffer per realtime topic; slow subscribers beyond this lag and drop messages
    #[serde(default = "default_realtime_channel_capacity")]
    pub realtime_channel_capacity: usize,
}

impl AppConfig {
    /// Construct a config with defaults for every tunable, used by tests and tooling.
    pub fn new(database_url: String, jwt_secret: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_issuer: "pharmaflow-identity".to_string(),
            jwt_audience: "pharmaflow-tracking".to_string(),
            jwt_expiration: 3600,
            host: "0.0.0.0".to_string(),
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            request_timeout_secs: default_request_timeout_secs(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            outbox_poll_interval_ms: default_outbox_poll_interval_ms(),
            outbox_batch_size: default_outbox_batch_size(),
            realtime_channel_capacity: default_realtime_channel_capacity(),
        }
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn outbox_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.outbox_poll_interval_ms)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message =
                Some("Set APP__CORS_ALLOWED_ORIGINS for non-development environments".into());
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development".into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_pool_bounds");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if !(10..=60_000).contains(&self.outbox_poll_interval_ms) {
            let mut err = ValidationError::new("range");
            err.message = Some("outbox_poll_interval_ms must be between 10 and 60000".into());
            errors.add("outbox_poll_interval_ms", err);
        }

        if !(1..=1000).contains(&self.outbox_batch_size) {
            let mut err = ValidationError::new("range");
            err.message = Some("outbox_batch_size must be between 1 and 1000".into());
            errors.add("outbox_batch_size", err);
        }

        if self.realtime_channel_capacity == 0 {
            let mut err = ValidationError::new("range");
            err.message = Some("realtime_channel_capacity must be positive".into());
            errors.add("realtime_channel_capacity", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout_secs() -> u64 {
    30
}
fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_outbox_poll_interval_ms() -> u64 {
    DEFAULT_OUTBOX_POLL_INTERVAL_MS
}
fn default_outbox_batch_size() -> u64 {
    DEFAULT_OUTBOX_BATCH_SIZE
}
fn default_realtime_channel_capacity() -> usize {
    DEFAULT_REALTIME_CHANNEL_CAPACITY
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    const DISALLOWED: [&str; 3] = ["secret", "changeme", "your-secret-key"];
    if DISALLOWED
        .iter()
        .any(|&bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret must not be a single repeated character".into());
            return Err(err);
        }
    }

    Ok(())
}

/// Initialise the global tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("pharmaflow_tracking={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables prefixed with `APP__`
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .set_default("database_url", "sqlite://pharmaflow.db?mode=rwc")?
        .set_default("jwt_issuer", "pharmaflow-identity")?
        .set_default("jwt_audience", "pharmaflow-tracking")?
        .set_default("jwt_expiration", 3600)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let builder = if run_env.eq_ignore_ascii_case(DEFAULT_ENV) {
        builder.set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?
    } else {
        builder
    };

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET to the identity provider's signing secret.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
