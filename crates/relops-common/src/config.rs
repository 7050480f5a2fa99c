//! Configuration management for the incident core
//!
//! Configuration is loaded from the environment; an optional TOML file
//! can provide a base that environment variables override.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub telemetry: TelemetryConfig,
    pub server: ServerConfig,
    pub detection: DetectionConfig,
}

/// PostgreSQL connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub sslmode: String,
}

/// External telemetry source endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub prometheus_url: String,
    pub loki_url: String,
    /// Trace collector endpoint, consumed by the external tracing collaborator
    pub trace_endpoint: Option<String>,
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Allowed CORS origins; startup fails fast when empty
    pub allowed_origins: Vec<String>,
}

/// Detector and background-job cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub interval_secs: u64,
    pub slo_interval_secs: u64,
}

impl DetectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn slo_interval(&self) -> Duration {
        Duration::from_secs(self.slo_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: "postgres".to_string(),
                dbname: "relops".to_string(),
                sslmode: "disable".to_string(),
            },
            telemetry: TelemetryConfig {
                prometheus_url: "http://prometheus:9090".to_string(),
                loki_url: "http://loki:3100".to_string(),
                trace_endpoint: None,
            },
            server: ServerConfig {
                port: 9000,
                allowed_origins: Vec::new(),
            },
            detection: DetectionConfig {
                interval_secs: 30,
                slo_interval_secs: 300,
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables on top of `base`.
    ///
    /// `CORS_ALLOWED_ORIGINS` is required: a missing or empty value is a
    /// configuration error so a misdeployed instance never serves with an
    /// open origin policy.
    pub fn from_env_with(base: Config) -> Result<Self> {
        let mut config = base;

        config.database.host = env_or("DB_HOST", config.database.host);
        config.database.port = env_parse("DB_PORT", config.database.port)?;
        config.database.user = env_or("DB_USER", config.database.user);
        config.database.password = env_or("DB_PASSWORD", config.database.password);
        config.database.dbname = env_or("DB_NAME", config.database.dbname);
        config.database.sslmode = env_or("DB_SSLMODE", config.database.sslmode);

        config.telemetry.prometheus_url = env_or("PROMETHEUS_URL", config.telemetry.prometheus_url);
        config.telemetry.loki_url = env_or("LOKI_URL", config.telemetry.loki_url);
        if let Ok(endpoint) = env::var("TRACE_ENDPOINT") {
            if !endpoint.is_empty() {
                config.telemetry.trace_endpoint = Some(endpoint);
            }
        }

        config.server.port = env_parse("PORT", config.server.port)?;
        if let Ok(origins) = env::var("CORS_ALLOWED_ORIGINS") {
            config.server.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if config.server.allowed_origins.is_empty() {
            return Err(Error::Configuration(
                "CORS_ALLOWED_ORIGINS must be set to a comma-separated list of allowed origins"
                    .to_string(),
            ));
        }

        config.detection.interval_secs =
            env_parse("DETECTION_INTERVAL_SECS", config.detection.interval_secs)?;
        config.detection.slo_interval_secs =
            env_parse("SLO_INTERVAL_SECS", config.detection.slo_interval_secs)?;

        Ok(config)
    }

    /// Load configuration from environment variables over defaults
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(Config::default())
    }
}

fn env_or(key: &str, default: String) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map_err(|_| Error::Configuration(format!("invalid value for {key}: {value}"))),
        _ => Ok(default),
    }
}
