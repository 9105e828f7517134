//! Configuration for the invoice ledger

use crate::distribution::DistributionTable;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Capacity of the writer mailbox (pending appends)
    pub mailbox_capacity: usize,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Tax configuration
    pub tax: TaxConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/invoice-ledger"),
            service_name: "invoice-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            mailbox_capacity: 1000,
            rocksdb: RocksDBConfig::default(),
            tax: TaxConfig::default(),
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
            max_write_buffer_number: 2,
            target_file_size_mb: 64,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Tax configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxConfig {
    /// Flat tax rate applied to every subtotal
    pub rate: Decimal,

    /// Distribution of collected tax over sectors
    pub distribution: DistributionTable,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            rate: Decimal::new(19, 2), // 19%
            distribution: DistributionTable::default(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("INVOICE_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(rate) = std::env::var("INVOICE_LEDGER_TAX_RATE") {
            config.tax.rate = Decimal::from_str(&rate).map_err(|e| {
                crate::Error::Config(format!("Invalid INVOICE_LEDGER_TAX_RATE {:?}: {}", rate, e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the tax rate and distribution table
    pub fn validate(&self) -> crate::Result<()> {
        if self.tax.rate < Decimal::ZERO || self.tax.rate > Decimal::ONE {
            return Err(crate::Error::Config(format!(
                "Tax rate must be within [0, 1], got {}",
                self.tax.rate
            )));
        }
        if self.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be positive".to_string(),
            ));
        }
        self.tax.distribution.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "invoice-ledger");
        assert_eq!(config.tax.rate, Decimal::new(19, 2));
        assert_eq!(config.tax.distribution.version, 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_rate_above_one() {
        let mut config = Config::default();
        config.tax.rate = Decimal::new(150, 2);
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/var/lib/invoice-ledger"
service_name = "invoice-ledger"
service_version = "0.1.0"
mailbox_capacity = 64

[rocksdb]
write_buffer_size_mb = 32
max_write_buffer_number = 2
target_file_size_mb = 32
max_background_jobs = 2
enable_statistics = false

[tax]
rate = "0.05"

[tax.distribution]
version = 2
remainder_sector = "Otros"

[[tax.distribution.sectors]]
name = "Salud"
percentage = "0.60"

[[tax.distribution.sectors.breakdown]]
name = "Hospitales"
percentage = "1"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.mailbox_capacity, 64);
        assert_eq!(config.tax.rate, Decimal::new(5, 2));
        assert_eq!(config.tax.distribution.version, 2);
        assert_eq!(config.tax.distribution.sectors.len(), 1);
        assert_eq!(config.tax.distribution.remainder_percentage(), Decimal::new(40, 2));
    }

    #[test]
    fn test_from_file_rejects_over_allocation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        let mut config = Config::default();
        config.tax.distribution.sectors[0].percentage = Decimal::ONE;
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        assert!(matches!(Config::from_file(&path), Err(crate::Error::Config(_))));
    }
}
