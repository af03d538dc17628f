use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Web server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8080
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://secretdrop.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Secret policy settings
#[derive(Debug, Deserialize, Clone)]
pub struct SecretsConfig {
    /// Maximum secret text length in characters
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    /// System-wide TTL ceiling; caller TTLs are clamped to this, and a
    /// missing caller TTL receives it, so storage growth stays bounded.
    #[serde(default = "default_max_ttl_secs")]
    pub max_ttl_secs: u64,
    /// Interval between eager sweeps of expired secrets
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_text_length() -> usize {
    10_000
}

fn default_max_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            max_text_length: default_max_text_length(),
            max_ttl_secs: default_max_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Ingestion queue settings
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Bounded queue depth; enqueue fails fast once full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default config file
            .add_source(File::with_name("config/default").required(false))
            // Override with local config if present
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (prefix: SECRETDROP_)
            // e.g., SECRETDROP_WEB__PORT, SECRETDROP_SECRETS__MAX_TTL_SECS
            .add_source(
                Environment::with_prefix("SECRETDROP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Initialize the global config singleton
    pub fn init() -> Result<&'static Self, ConfigError> {
        let config = Self::load()?;
        Ok(CONFIG.get_or_init(|| config))
    }

    /// Get reference to the global config
    pub fn get() -> &'static Self {
        CONFIG.get().expect("Config not initialized. Call AppConfig::init() first.")
    }
}
