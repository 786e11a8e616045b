use config::{Config, ConfigError, Environment, File};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::coordinator::{CoordinatorConfig, VaultAccounts};
use crate::domain::{AccountId, AssetId, PRECISION};
use crate::emergency::EmergencyParams;
use crate::error::{Result, VaultError};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub vault: VaultConfig,
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub emergency: EmergencyConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub underlying_asset: String,
    /// Fraction of round profit taken as fee (0.1 = 10%)
    pub performance_fee_rate: Decimal,
    #[serde(default)]
    pub min_round_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    pub lead_operator: String,
    pub lead_account: String,
    pub pool: String,
    pub admin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyConfig {
    /// Seconds without a settlement before an unwind may be forced
    #[serde(default = "default_emergency_period")]
    pub period_secs: u64,
    /// Percent (1.5 = 1.5%)
    #[serde(default = "default_slippage_pct")]
    pub default_slippage_pct: Decimal,
    /// Percent added after every partial unwind
    #[serde(default = "default_slippage_step_pct")]
    pub slippage_step_pct: Decimal,
}

fn default_emergency_period() -> u64 {
    15 * 3600
}

fn default_slippage_pct() -> Decimal {
    Decimal::new(15, 1)
}

fn default_slippage_step_pct() -> Decimal {
    Decimal::ONE
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            period_secs: default_emergency_period(),
            default_slippage_pct: default_slippage_pct(),
            slippage_step_pct: default_slippage_step_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_max_price_age")]
    pub max_price_age_secs: u64,
}

fn default_max_price_age() -> u64 {
    3600
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_price_age_secs: default_max_price_age(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily-rolling log files
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

/// Percent → basis points (1.5 → 150)
fn pct_to_bps(pct: Decimal) -> Option<u32> {
    (pct * Decimal::ONE_HUNDRED).round().to_u32()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("vault.min_round_interval_secs", 0)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("COPYVAULT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (COPYVAULT__VAULT__PERFORMANCE_FEE_RATE, etc.)
            .add_source(
                Environment::with_prefix("COPYVAULT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Configuration used by `simulate` and tests
    pub fn default_config() -> Self {
        use rust_decimal_macros::dec;

        Self {
            vault: VaultConfig {
                underlying_asset: "USDC".to_string(),
                performance_fee_rate: dec!(0.1),
                min_round_interval_secs: 0,
            },
            accounts: AccountsConfig {
                lead_operator: "lead-operator".to_string(),
                lead_account: "lead".to_string(),
                pool: "pool".to_string(),
                admin: "admin".to_string(),
            },
            emergency: EmergencyConfig::default(),
            oracle: OracleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.vault.underlying_asset.trim().is_empty() {
            errors.push("vault.underlying_asset must not be empty".to_string());
        }

        let fee = self.vault.performance_fee_rate;
        if fee < Decimal::ZERO || fee >= Decimal::ONE {
            errors.push(format!(
                "vault.performance_fee_rate must be in [0, 1), got {fee}"
            ));
        }

        let accounts = [
            ("lead_operator", &self.accounts.lead_operator),
            ("lead_account", &self.accounts.lead_account),
            ("pool", &self.accounts.pool),
            ("admin", &self.accounts.admin),
        ];
        for (name, id) in &accounts {
            if id.trim().is_empty() {
                errors.push(format!("accounts.{name} must not be empty"));
            }
        }
        for (i, (a_name, a)) in accounts.iter().enumerate() {
            for (b_name, b) in &accounts[i + 1..] {
                if a == b && !a.trim().is_empty() {
                    errors.push(format!("accounts.{a_name} and accounts.{b_name} must differ"));
                }
            }
        }

        for (name, pct) in [
            ("emergency.default_slippage_pct", self.emergency.default_slippage_pct),
            ("emergency.slippage_step_pct", self.emergency.slippage_step_pct),
        ] {
            if pct <= Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
                errors.push(format!("{name} must be in (0, 100], got {pct}"));
            }
        }

        if self.emergency.period_secs == 0 {
            errors.push("emergency.period_secs must be positive".to_string());
        }

        if self.oracle.max_price_age_secs == 0 {
            errors.push("oracle.max_price_age_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Integer engine settings
    pub fn coordinator_config(&self) -> Result<CoordinatorConfig> {
        self.validate()
            .map_err(|errors| VaultError::Validation(errors.join("; ")))?;

        let fee_rate = (self.vault.performance_fee_rate * Decimal::from(PRECISION as u64))
            .trunc()
            .to_u128()
            .ok_or_else(|| VaultError::Validation("performance_fee_rate out of range".to_string()))?;
        let default_slippage_bps = pct_to_bps(self.emergency.default_slippage_pct)
            .ok_or_else(|| VaultError::Validation("default_slippage_pct out of range".to_string()))?;
        let slippage_step_bps = pct_to_bps(self.emergency.slippage_step_pct)
            .ok_or_else(|| VaultError::Validation("slippage_step_pct out of range".to_string()))?;

        Ok(CoordinatorConfig {
            accounts: VaultAccounts {
                lead_operator: AccountId::new(&self.accounts.lead_operator),
                lead_account: AccountId::new(&self.accounts.lead_account),
                pool: AccountId::new(&self.accounts.pool),
                admin: AccountId::new(&self.accounts.admin),
            },
            underlying_asset: AssetId::new(&self.vault.underlying_asset),
            performance_fee_rate: fee_rate,
            min_round_interval_secs: self.vault.min_round_interval_secs,
            emergency: EmergencyParams {
                period_secs: self.emergency.period_secs,
                default_slippage_bps,
                slippage_step_bps,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_converts_to_engine_units() {
        let config = AppConfig::default_config();
        let engine = config.coordinator_config().unwrap();

        assert_eq!(engine.performance_fee_rate, PRECISION / 10);
        assert_eq!(engine.emergency.default_slippage_bps, 150);
        assert_eq!(engine.emergency.slippage_step_bps, 100);
        assert_eq!(engine.emergency.period_secs, 54_000);
        assert_eq!(engine.accounts.pool.as_str(), "pool");
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = AppConfig::default_config();
        config.vault.performance_fee_rate = dec!(1.5);
        config.accounts.admin = "pool".to_string();
        config.emergency.slippage_step_pct = dec!(0);

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(config.coordinator_config().is_err());
    }

    #[test]
    fn test_load_from_missing_dir_fails_without_required_sections() {
        // No files: required sections are missing, so deserialization fails loudly
        assert!(AppConfig::load_from("/nonexistent-copyvault-config").is_err());
    }
}
