//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The configuration file path defaults to `config.yaml` but
//! can be specified via `-f` flag or `AIRANK_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources
//! override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `AIRANK_` override YAML values
//! 3. **DATABASE_URL / REDIS_URL** - Special cases: override `database.url` and `cache.url`
//!
//! For nested config values, use double underscores in environment
//! variables: `AIRANK_CACHE__COMMAND_TIMEOUT=500ms` sets
//! `cache.command_timeout`.
//!
//! Every field has a default, so the service starts without a config file
//! (pointing at a local Postgres, with the in-process ranking cache).

use clap::Parser;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "AIRANK_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base URL of the leaderboard frontend, used for the device-flow
    /// verification URI.
    pub dashboard_url: String,
    /// Convenience override consumed by `Config::load`; prefer the
    /// DATABASE_URL environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Convenience override consumed by `Config::load`; prefer the
    /// REDIS_URL environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    /// Durable store (PostgreSQL) connection settings
    pub database: DatabaseConfig,
    /// Volatile store (Redis) settings; absent URL degrades to the
    /// in-process cache
    pub cache: CacheConfig,
    /// Service-role credential for privileged writes
    pub auth: AuthConfig,
    /// Leaderboard read settings
    pub leaderboard: LeaderboardConfig,
    /// CORS allowed origins ("*" for any)
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            dashboard_url: "http://localhost:3000".to_string(),
            database_url: None,
            redis_url: None,
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            auth: AuthConfig::default(),
            leaderboard: LeaderboardConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,
    pub pool: PoolSettings,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/airank".to_string(),
            pool: PoolSettings::default(),
        }
    }
}

/// Connection pool parameters for the durable store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Redis connection string. When absent, rankings and peak tracking
    /// run on the in-process cache instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Deadline for the volatile section of an ingestion request. The
    /// cache fails open past this.
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
    /// How long per-second throughput buckets are retained.
    #[serde(with = "humantime_serde")]
    pub throughput_window: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            command_timeout: Duration::from_millis(500),
            throughput_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Bearer credential required by the profile-sync and device-approval
    /// endpoints. When unset those endpoints reject all callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeaderboardConfig {
    /// Maximum number of users returned by the leaderboard listing
    pub limit: i64,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self { limit: 100 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // DATABASE_URL / REDIS_URL take precedence over the nested fields
        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }
        if let Some(url) = config.redis_url.take() {
            config.cache.url = Some(url);
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("AIRANK_").split("__"))
            // Common DATABASE_URL / REDIS_URL patterns
            .merge(Env::raw().only(&["DATABASE_URL", "REDIS_URL"]))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        Url::parse(&self.dashboard_url).map_err(|e| Error::Internal {
            operation: format!("Config validation: dashboard_url is not a valid URL: {e}"),
        })?;

        if self.leaderboard.limit <= 0 {
            return Err(Error::Internal {
                operation: "Config validation: leaderboard.limit must be positive".to_string(),
            });
        }

        if self.cache.command_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: cache.command_timeout must be non-zero".to_string(),
            });
        }

        if self.cache.throughput_window < Duration::from_secs(1) {
            return Err(Error::Internal {
                operation: "Config validation: cache.throughput_window must be at least 1 second".to_string(),
            });
        }

        if self.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: cors.allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
