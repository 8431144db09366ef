//! Engine configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//! The two policies and the posting tolerance can be overridden through
//! `TALLYBOOK_*` environment variables.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tallybook_accounting::{ChartOfAccounts, default_tolerance};
use tallybook_inventory::valuation::StockFloorPolicy;
use tallybook_parties::AdjustmentSignPolicy;

pub const ENV_POSTING_TOLERANCE: &str = "TALLYBOOK_POSTING_TOLERANCE";
pub const ENV_STOCK_FLOOR: &str = "TALLYBOOK_STOCK_FLOOR";
pub const ENV_ADJUSTMENT_SIGN: &str = "TALLYBOOK_ADJUSTMENT_SIGN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override or file value is out of range.
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest accepted `|Σdebit − Σcredit|` is just below this value.
    pub posting_tolerance: Decimal,

    pub stock_floor: StockFloorPolicy,

    /// Applied when manual adjustment and commission entries are written.
    pub adjustment_sign: AdjustmentSignPolicy,

    pub accounts: ChartOfAccounts,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            posting_tolerance: default_tolerance(),
            stock_floor: StockFloorPolicy::default(),
            adjustment_sign: AdjustmentSignPolicy::default(),
            accounts: ChartOfAccounts::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file, then apply environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)?.with_env_overrides()
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (keyed by the `TALLYBOOK_*` names).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_POSTING_TOLERANCE) {
            self.posting_tolerance = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                key: ENV_POSTING_TOLERANCE.to_string(),
                reason: format!("{e}"),
            })?;
        }
        if let Some(raw) = lookup(ENV_STOCK_FLOOR) {
            self.stock_floor = raw.parse().map_err(|e| ConfigError::Invalid {
                key: ENV_STOCK_FLOOR.to_string(),
                reason: format!("{e}"),
            })?;
        }
        if let Some(raw) = lookup(ENV_ADJUSTMENT_SIGN) {
            self.adjustment_sign = raw.parse().map_err(|e| ConfigError::Invalid {
                key: ENV_ADJUSTMENT_SIGN.to_string(),
                reason: format!("{e}"),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.posting_tolerance <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "posting_tolerance".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.posting_tolerance, dec!(0.01));
        assert_eq!(config.stock_floor, StockFloorPolicy::ClampToZero);
    }

    #[test]
    fn parses_policies_and_accounts() {
        let config = EngineConfig::from_toml_str(
            r#"
            posting_tolerance = "0.005"
            stock_floor = "report"
            adjustment_sign = "positive_only"

            [accounts.bank]
            code = "1020"
            name = "Main Bank"
            kind = "asset"
            "#,
        )
        .unwrap();

        assert_eq!(config.posting_tolerance, dec!(0.005));
        assert_eq!(config.stock_floor, StockFloorPolicy::Report);
        assert_eq!(config.adjustment_sign, AdjustmentSignPolicy::PositiveOnly);
        assert_eq!(config.accounts.bank.code, "1020");
        assert_eq!(config.accounts.cash, ChartOfAccounts::default().cash);
    }

    #[test]
    fn overrides_take_precedence() {
        let config = EngineConfig::default()
            .with_overrides(|key| match key {
                ENV_STOCK_FLOOR => Some("report".to_string()),
                ENV_POSTING_TOLERANCE => Some(" 0.02 ".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.stock_floor, StockFloorPolicy::Report);
        assert_eq!(config.posting_tolerance, dec!(0.02));
        assert_eq!(config.adjustment_sign, AdjustmentSignPolicy::FollowAmountSign);
    }

    #[test]
    fn rejects_bad_values() {
        let err = EngineConfig::default()
            .with_overrides(|key| (key == ENV_ADJUSTMENT_SIGN).then(|| "sometimes".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == ENV_ADJUSTMENT_SIGN));

        let err = EngineConfig::from_toml_str("posting_tolerance = \"0\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        assert!(matches!(
            EngineConfig::from_toml_str("stock_floor = 3").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }
}
