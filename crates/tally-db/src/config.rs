//! # POS Configuration
//!
//! Settings the ledger services read at runtime.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_DB_PATH=/var/lib/tally/tally.db                              │
//! │     TALLY_CASH_PREFIX=CSH                                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/tally.toml (Linux)                             │
//! │     ~/Library/Application Support/com.tally.pos/tally.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "tally.db"
//! max_connections = 5
//!
//! [ledger]
//! cash_prefix = "CSH"
//! order_prefix = "ORD"
//! return_prefix = "RET"
//!
//! [payments]
//! max_overpayment_ratio_bps = 20000   # 2× the order total
//!
//! [loyalty]
//! points_per_unit = 1
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use tally_core::validation::validate_prefix;
use tally_core::DEFAULT_MAX_OVERPAYMENT_RATIO_BPS;

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "tally", "pos")
        .map(|dirs| dirs.data_dir().join("tally.db"))
        .unwrap_or_else(|| PathBuf::from("tally.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

/// `[ledger]` section: prefixes of human-readable numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(default = "default_cash_prefix")]
    pub cash_prefix: String,

    #[serde(default = "default_order_prefix")]
    pub order_prefix: String,

    #[serde(default = "default_return_prefix")]
    pub return_prefix: String,
}

fn default_cash_prefix() -> String {
    "CSH".to_string()
}

fn default_order_prefix() -> String {
    "ORD".to_string()
}

fn default_return_prefix() -> String {
    "RET".to_string()
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            cash_prefix: default_cash_prefix(),
            order_prefix: default_order_prefix(),
            return_prefix: default_return_prefix(),
        }
    }
}

/// `[payments]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSettings {
    /// Tendered total may not exceed this many basis points of the order total.
    #[serde(default = "default_overpayment_ratio")]
    pub max_overpayment_ratio_bps: u32,
}

fn default_overpayment_ratio() -> u32 {
    DEFAULT_MAX_OVERPAYMENT_RATIO_BPS
}

impl Default for PaymentSettings {
    fn default() -> Self {
        PaymentSettings {
            max_overpayment_ratio_bps: default_overpayment_ratio(),
        }
    }
}

/// `[loyalty]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltySettings {
    /// Points earned per whole currency unit of an order total.
    #[serde(default = "default_points_per_unit")]
    pub points_per_unit: i64,
}

fn default_points_per_unit() -> i64 {
    1
}

impl Default for LoyaltySettings {
    fn default() -> Self {
        LoyaltySettings {
            points_per_unit: default_points_per_unit(),
        }
    }
}

// =============================================================================
// PosConfig
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PosConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub payments: PaymentSettings,

    #[serde(default)]
    pub loyalty: LoyaltySettings,
}

impl PosConfig {
    /// Loads configuration from file, then environment, then validates.
    ///
    /// A missing file is not an error; defaults are used.
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| DbError::Config(format!("{}: {}", path.display(), e)))?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document. Missing sections take their defaults.
    pub fn from_toml(contents: &str) -> DbResult<Self> {
        toml::from_str(contents).map_err(|e| DbError::Config(e.to_string()))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        for (field, prefix) in [
            ("ledger.cash_prefix", &self.ledger.cash_prefix),
            ("ledger.order_prefix", &self.ledger.order_prefix),
            ("ledger.return_prefix", &self.ledger.return_prefix),
        ] {
            validate_prefix(field, prefix).map_err(|e| DbError::Config(e.to_string()))?;
        }

        if self.payments.max_overpayment_ratio_bps < 10_000 {
            return Err(DbError::Config(
                "payments.max_overpayment_ratio_bps must be at least 10000 (1×)".into(),
            ));
        }

        if self.loyalty.points_per_unit < 0 {
            return Err(DbError::Config(
                "loyalty.points_per_unit must not be negative".into(),
            ));
        }

        if self.database.max_connections == 0
            || self.database.min_connections > self.database.max_connections
        {
            return Err(DbError::Config(
                "database connections: need 0 < min <= max".into(),
            ));
        }

        Ok(())
    }

    /// Applies `TALLY_*` environment overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("TALLY_DB_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse::<u32>() {
                self.database.max_connections = n;
            }
        }

        if let Ok(prefix) = std::env::var("TALLY_CASH_PREFIX") {
            self.ledger.cash_prefix = prefix;
        }

        if let Ok(prefix) = std::env::var("TALLY_ORDER_PREFIX") {
            self.ledger.order_prefix = prefix;
        }

        if let Ok(prefix) = std::env::var("TALLY_RETURN_PREFIX") {
            self.ledger.return_prefix = prefix;
        }

        if let Ok(ratio) = std::env::var("TALLY_MAX_OVERPAYMENT_RATIO_BPS") {
            match ratio.parse::<u32>() {
                Ok(r) => self.payments.max_overpayment_ratio_bps = r,
                Err(_) => warn!(value = %ratio, "Ignoring invalid TALLY_MAX_OVERPAYMENT_RATIO_BPS"),
            }
        }

        if let Ok(points) = std::env::var("TALLY_POINTS_PER_UNIT") {
            match points.parse::<i64>() {
                Ok(p) => self.loyalty.points_per_unit = p,
                Err(_) => warn!(value = %points, "Ignoring invalid TALLY_POINTS_PER_UNIT"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    /// Pool settings for [`crate::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PosConfig::default();
        assert_eq!(config.ledger.cash_prefix, "CSH");
        assert_eq!(config.ledger.order_prefix, "ORD");
        assert_eq!(config.ledger.return_prefix, "RET");
        assert_eq!(config.payments.max_overpayment_ratio_bps, 20_000);
        assert_eq!(config.loyalty.points_per_unit, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PosConfig::from_toml(
            r#"
            [ledger]
            cash_prefix = "CASH"

            [loyalty]
            points_per_unit = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.ledger.cash_prefix, "CASH");
        assert_eq!(config.ledger.order_prefix, "ORD");
        assert_eq!(config.loyalty.points_per_unit, 2);
        assert_eq!(config.payments.max_overpayment_ratio_bps, 20_000);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = PosConfig::default();
        config.ledger.cash_prefix = "csh".into();
        assert!(config.validate().is_err());

        let mut config = PosConfig::default();
        config.payments.max_overpayment_ratio_bps = 5_000;
        assert!(config.validate().is_err());

        let mut config = PosConfig::default();
        config.database.min_connections = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config =
            PosConfig::load(Some(PathBuf::from("/nonexistent/dir/tally.toml"))).unwrap();
        assert!(config.validate().is_ok());
    }
}
