use std::collections::HashSet;

use crate::domain::{AccountId, AssetId, TradeInstruction};
use crate::error::{Result, VaultError};

/// Investor and asset allow-listing
pub trait AccessPolicy: Send + Sync {
    fn is_investor_allowed(&self, account: &AccountId) -> bool;

    fn is_asset_allowed(&self, asset: &AssetId) -> bool;
}

/// Gate for every participant-facing entry point
pub fn enforce_investor(policy: &dyn AccessPolicy, account: &AccountId) -> Result<()> {
    if policy.is_investor_allowed(account) {
        return Ok(());
    }
    Err(VaultError::UserNotAllowed(account.clone()))
}

/// Every asset an instruction touches must be tradable
pub fn enforce_instruction_assets(
    policy: &dyn AccessPolicy,
    instruction: &TradeInstruction,
) -> Result<()> {
    match instruction
        .assets()
        .into_iter()
        .find(|asset| !policy.is_asset_allowed(asset))
    {
        Some(asset) => Err(VaultError::AssetNotAllowed(asset.clone())),
        None => Ok(()),
    }
}

/// Fixed allow-lists. An empty asset list allows every asset.
#[derive(Debug, Clone, Default)]
pub struct StaticAllowList {
    investors: HashSet<AccountId>,
    assets: HashSet<AssetId>,
}

impl StaticAllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_investor(mut self, account: impl Into<AccountId>) -> Self {
        self.investors.insert(account.into());
        self
    }

    pub fn allow_asset(mut self, asset: impl Into<AssetId>) -> Self {
        self.assets.insert(asset.into());
        self
    }
}

impl AccessPolicy for StaticAllowList {
    fn is_investor_allowed(&self, account: &AccountId) -> bool {
        self.investors.contains(account)
    }

    fn is_asset_allowed(&self, asset: &AssetId) -> bool {
        self.assets.is_empty() || self.assets.contains(asset)
    }
}
