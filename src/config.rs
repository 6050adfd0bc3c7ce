//! Configuration management for the risk pipeline
//!
//! Values come from `config/config.toml`, overridden by `RISK__SECTION__KEY`
//! environment variables (e.g. `RISK__STORE__DATABASE_PATH`).

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub store: StoreConfig,
    pub model: ModelConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for risk assessment requests
    pub assess_subject: String,
    /// Subject for operator-triggered model reloads
    pub reload_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            assess_subject: "risk.assess".to_string(),
            reload_subject: "risk.model.reload".to_string(),
        }
    }
}

/// ERP database location
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    /// Read-only connections shared by concurrent assessments
    pub read_connections: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("db.sqlite3"),
            read_connections: 4,
        }
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// JSON artifact; ONNX graphs it references resolve relative to it
    pub artifact_path: PathBuf,
    /// Number of threads for ONNX inference (default: 1)
    pub onnx_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("models/risk_model.json"),
            onnx_threads: 1,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Maximum concurrent assessments
    pub workers: usize,
    /// Seconds between metrics summaries; 0 disables the reporter
    pub metrics_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            metrics_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path, then apply `RISK__` overrides.
    /// A missing file falls back to defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("RISK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.nats.assess_subject, "risk.assess");
        assert_eq!(config.model.artifact_path, PathBuf::from("models/risk_model.json"));
        assert_eq!(config.service.workers, 4);
        assert_eq!(config.store.read_connections, 4);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[store]\ndatabase_path = \"/srv/erp/db.sqlite3\"").unwrap();
        writeln!(file, "[service]\nworkers = 8").unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.store.database_path, PathBuf::from("/srv/erp/db.sqlite3"));
        assert_eq!(config.service.workers, 8);
        assert_eq!(config.service.metrics_interval_secs, 60);
        assert_eq!(config.nats.reload_subject, "risk.model.reload");
    }

    #[test]
    fn test_shipped_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config = AppConfig::load_from_path(path).unwrap();
        assert_eq!(config.nats.assess_subject, "risk.assess");
    }
}
