//! Configuration management

use serde::{Deserialize, Serialize};

use crate::schema::StorageMode;

// ============================================================================
// ETL Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/weboxdb";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default invoice table name.
pub const DEFAULT_TABLE_NAME: &str = "faturamento";

/// Default inbox directory watched for new source files.
pub const DEFAULT_INBOX_DIR: &str = "/data/inbox";

/// Default client id when the file name carries none.
pub const DEFAULT_CLIENTE_ID: &str = "cliente_demo";

/// Default interval between inbox scans, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default upper bound for persisted `error_message` text, in characters.
pub const DEFAULT_ERROR_MESSAGE_LIMIT: usize = 1000;

/// ETL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Target invoice table.
    pub table_name: String,
    /// Directory the watcher polls for new files.
    pub inbox_dir: String,
    /// Fallback client id when the file name has no `<cliente>__` prefix.
    pub default_cliente_id: String,
    /// Seconds between inbox scans.
    pub poll_interval_secs: u64,
    /// Payload storage strategy.
    pub storage_mode: StorageMode,
    /// Persisted error messages are truncated to this many characters.
    pub error_message_limit: usize,
}

impl EtlConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = EtlConfig {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: std::env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: std::env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
            },
            ingest: IngestConfig {
                table_name: std::env::var("FATURAMENTO_TABLE")
                    .unwrap_or_else(|_| DEFAULT_TABLE_NAME.to_string()),
                inbox_dir: std::env::var("INBOX_DIR")
                    .unwrap_or_else(|_| DEFAULT_INBOX_DIR.to_string()),
                default_cliente_id: std::env::var("CLIENTE_ID")
                    .unwrap_or_else(|_| DEFAULT_CLIENTE_ID.to_string()),
                poll_interval_secs: std::env::var("POLL_INTERVAL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
                storage_mode: std::env::var("STORAGE_MODE")
                    .ok()
                    .map(|s| s.parse::<StorageMode>())
                    .transpose()?
                    .unwrap_or_default(),
                error_message_limit: std::env::var("ERROR_MESSAGE_LIMIT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_ERROR_MESSAGE_LIMIT),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        // The table name is interpolated into SQL (quoted); restrict it to a
        // plain identifier so quoting is always sufficient.
        let table = &self.ingest.table_name;
        let valid_ident = !table.is_empty()
            && table.chars().next().is_some_and(|c| c.is_ascii_lowercase() || c == '_')
            && table.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid_ident {
            anyhow::bail!("Invalid table name: {:?}", table);
        }

        if self.ingest.poll_interval_secs == 0 {
            anyhow::bail!("Poll interval must be greater than 0");
        }

        if self.ingest.error_message_limit == 0 {
            anyhow::bail!("Error message limit must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> EtlConfig {
        EtlConfig {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            ingest: IngestConfig {
                table_name: DEFAULT_TABLE_NAME.to_string(),
                inbox_dir: DEFAULT_INBOX_DIR.to_string(),
                default_cliente_id: DEFAULT_CLIENTE_ID.to_string(),
                poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
                storage_mode: StorageMode::default(),
                error_message_limit: DEFAULT_ERROR_MESSAGE_LIMIT,
            },
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_min_above_max_connections() {
        let mut config = base_config();
        config.database.min_connections = 20;
        config.database.max_connections = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_table_names() {
        for bad in ["", "Faturamento", "fatura mento", "1table", "t;drop"] {
            let mut config = base_config();
            config.ingest.table_name = bad.to_string();
            assert!(config.validate().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_accepts_underscore_table_name() {
        let mut config = base_config();
        config.ingest.table_name = "_faturamento_v2".to_string();
        assert!(config.validate().is_ok());
    }
}
