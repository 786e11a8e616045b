//! Coordinator Configuration
//!
//! Engine-level settings in integer form. Built from `AppConfig` at startup.

use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, AssetId};
use crate::emergency::EmergencyParams;

/// Fixed identities the coordinator acts on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultAccounts {
    /// Operator wallet allowed to fund the lead and issue instructions
    pub lead_operator: AccountId,
    /// Account holding lead capital and positions
    pub lead_account: AccountId,
    /// Follower pool account
    pub pool: AccountId,
    /// Receives performance fees and emergency withdrawals
    pub admin: AccountId,
}

impl Default for VaultAccounts {
    fn default() -> Self {
        Self {
            lead_operator: AccountId::new("lead-operator"),
            lead_account: AccountId::new("lead"),
            pool: AccountId::new("pool"),
            admin: AccountId::new("admin"),
        }
    }
}

/// Configuration for the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub accounts: VaultAccounts,
    /// Asset deposits, withdrawals and NAV are denominated in
    pub underlying_asset: AssetId,
    /// Performance fee on round profit, 1e18 fixed point
    pub performance_fee_rate: u128,
    /// Minimum seconds between settlements (0 disables the check)
    pub min_round_interval_secs: u64,
    pub emergency: EmergencyParams,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            accounts: VaultAccounts::default(),
            underlying_asset: AssetId::new("USDC"),
            performance_fee_rate: crate::domain::PRECISION / 10,
            min_round_interval_secs: 0,
            emergency: EmergencyParams::default(),
        }
    }
}
