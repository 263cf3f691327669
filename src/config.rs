//! Configuration management for Mediashelf server

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// What the record mapper does with a cell that fails conversion
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MalformedCellPolicy {
    /// Keep the row, leave the field at its default value
    #[default]
    DefaultField,
    /// Drop the whole row and report it as skipped
    SkipRow,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ImportConfig {
    /// Separator for multi-valued cells (authors, genres, ...)
    pub list_delimiter: char,
    /// Field separator of uploaded spreadsheets
    pub csv_delimiter: char,
    pub malformed_cells: MalformedCellPolicy,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Maximum number of entities enriched concurrently
    pub workers: usize,
    pub request_timeout_secs: u64,
    /// Period of the background scheduler, 0 disables it
    pub interval_secs: u64,
    /// Minimum age of a retryable failure before it is submitted again
    pub retry_after_secs: i64,
    pub batch_size: usize,
    pub max_image_bytes: usize,
    pub user_agent: String,
    pub openlibrary_url: String,
    pub upc_lookup_url: String,
    pub image_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON snapshot of the entity store; in-memory only when unset
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Layer on the environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add environment variables (e.g. MEDIASHELF_ENRICHMENT__WORKERS)
            .add_source(
                Environment::with_prefix("MEDIASHELF")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            // Override snapshot location from SNAPSHOT_PATH env var if present
            .set_override_option("storage.snapshot_path", env::var("SNAPSHOT_PATH").ok())?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            list_delimiter: '|',
            csv_delimiter: ',',
            malformed_cells: MalformedCellPolicy::DefaultField,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            request_timeout_secs: 20,
            interval_secs: 0,
            retry_after_secs: 6 * 60 * 60,
            batch_size: 100,
            max_image_bytes: 8 * 1024 * 1024,
            user_agent: format!("mediashelf/{}", env!("CARGO_PKG_VERSION")),
            openlibrary_url: "https://openlibrary.org".to_string(),
            upc_lookup_url: "https://api.upcitemdb.com".to_string(),
            image_dir: PathBuf::from("data/covers"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            import: ImportConfig::default(),
            enrichment: EnrichmentConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.import.list_delimiter, '|');
        assert_eq!(config.import.malformed_cells, MalformedCellPolicy::DefaultField);
        assert!(config.enrichment.workers > 0);
        assert!(config.storage.snapshot_path.is_none());
    }

    #[test]
    fn test_policy_deserializes_from_snake_case() {
        let policy: MalformedCellPolicy = serde_json::from_str("\"skip_row\"").unwrap();
        assert_eq!(policy, MalformedCellPolicy::SkipRow);
    }
}
