//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty file is a valid config.
//!
//! ```toml
//! log_level = "info"
//!
//! [store]
//! max_transaction_attempts = 5
//!
//! [consistency]
//! balance_tolerance = "0.01"
//! prefer_ledger = true
//!
//! [stock]
//! idempotent_reversal = true
//!
//! [journal]
//! path = "data/journal.log"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use ledger_kernel::arithmetic::Amount;
use ledger_kernel::consistency::{BalancePolicy, DEFAULT_BALANCE_TOLERANCE};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub log_level: String,
    pub store: StoreConfig,
    pub consistency: ConsistencyConfig,
    pub stock: StockConfig,
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub max_transaction_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsistencyConfig {
    #[serde(deserialize_with = "decimal_amount")]
    pub balance_tolerance: Amount,
    pub prefer_ledger: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StockConfig {
    /// Skip a reversal whose `_reversal` history entry already exists.
    pub idempotent_reversal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JournalConfig {
    pub path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            store: StoreConfig::default(),
            consistency: ConsistencyConfig::default(),
            stock: StockConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_transaction_attempts: 5,
        }
    }
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            balance_tolerance: DEFAULT_BALANCE_TOLERANCE,
            prefer_ledger: true,
        }
    }
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            idempotent_reversal: true,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.max_transaction_attempts == 0 {
            return Err(ConfigError::Invalid(
                "store.max_transaction_attempts must be at least 1".to_string(),
            ));
        }
        if self.consistency.balance_tolerance.is_negative() {
            return Err(ConfigError::Invalid(format!(
                "consistency.balance_tolerance must not be negative, got {}",
                self.consistency.balance_tolerance
            )));
        }
        Ok(())
    }

    pub fn balance_policy(&self) -> BalancePolicy {
        BalancePolicy {
            tolerance: self.consistency.balance_tolerance,
            prefer_ledger: self.consistency.prefer_ledger,
        }
    }
}

fn decimal_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
    let text = String::deserialize(deserializer)?;
    text.parse().map_err(serde::de::Error::custom)
}
