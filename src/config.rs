//! Configuration for the credit ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// Credit policy configuration
    pub credits: CreditsConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/credit-ledger"),
            service_name: "credit-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            credits: CreditsConfig::default(),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// Credit policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsConfig {
    /// Credits granted at registration
    pub registration_bonus: i64,

    /// Balance below which a user counts as low on credits
    pub low_balance_threshold: i64,

    /// Magnitude ceiling for a single apply
    pub max_single_operation_amount: i64,

    /// History page size when the caller gives none
    pub default_page_limit: usize,

    /// History page size ceiling
    pub max_page_limit: usize,

    /// Transaction description length ceiling (chars)
    pub max_description_len: usize,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            registration_bonus: 100,
            low_balance_threshold: 20,
            max_single_operation_amount: 10_000,
            default_page_limit: 20,
            max_page_limit: 100,
            max_description_len: 500,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("LEDGER_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        if let Ok(bonus) = std::env::var("LEDGER_REGISTRATION_BONUS") {
            config.credits.registration_bonus = bonus
                .parse()
                .map_err(|_| crate::Error::Config("LEDGER_REGISTRATION_BONUS must be an integer".to_string()))?;
        }

        if let Ok(threshold) = std::env::var("LEDGER_LOW_BALANCE_THRESHOLD") {
            config.credits.low_balance_threshold = threshold
                .parse()
                .map_err(|_| crate::Error::Config("LEDGER_LOW_BALANCE_THRESHOLD must be an integer".to_string()))?;
        }

        Ok(config)
    }
}
