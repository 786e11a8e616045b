//! Asset Book
//!
//! Integer balances per account and asset. Wallets, the lead account, the pool and the
//! admin all hold their assets here; every movement is a checked debit/credit pair.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::{AccountId, AssetId, PositionDelta};
use crate::error::{Result, VaultError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBook {
    balances: HashMap<AccountId, BTreeMap<AssetId, u128>>,
}

impl AssetBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account: &AccountId, asset: &AssetId) -> u128 {
        self.balances
            .get(account)
            .and_then(|assets| assets.get(asset))
            .copied()
            .unwrap_or(0)
    }

    /// All non-zero holdings of an account
    pub fn holdings(&self, account: &AccountId) -> Vec<(AssetId, u128)> {
        self.balances
            .get(account)
            .map(|assets| {
                assets
                    .iter()
                    .filter(|(_, amount)| **amount > 0)
                    .map(|(asset, amount)| (asset.clone(), *amount))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn credit(&mut self, account: &AccountId, asset: &AssetId, amount: u128) -> Result<()> {
        let slot = self
            .balances
            .entry(account.clone())
            .or_default()
            .entry(asset.clone())
            .or_insert(0);
        *slot = slot
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow("book credit"))?;
        Ok(())
    }

    pub fn debit(&mut self, account: &AccountId, asset: &AssetId, amount: u128) -> Result<()> {
        let available = self.balance(account, asset);
        if available < amount {
            return Err(VaultError::InsufficientBalance {
                account: account.clone(),
                asset: asset.clone(),
                available,
                requested: amount,
            });
        }
        if let Some(slot) = self
            .balances
            .get_mut(account)
            .and_then(|assets| assets.get_mut(asset))
        {
            *slot -= amount;
        }
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        asset: &AssetId,
        amount: u128,
    ) -> Result<()> {
        self.debit(from, asset, amount)?;
        self.credit(to, asset, amount)
    }

    /// Fail unless `account` holds `amount` of `asset` beyond `reserved`
    pub fn ensure_available(
        &self,
        account: &AccountId,
        asset: &AssetId,
        amount: u128,
        reserved: u128,
    ) -> Result<()> {
        let available = self.balance(account, asset).saturating_sub(reserved);
        if available < amount {
            return Err(VaultError::InsufficientBalance {
                account: account.clone(),
                asset: asset.clone(),
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Apply venue-reported deltas to one account.
    ///
    /// Debits are checked before anything is written, so a failing set leaves the book unchanged.
    pub fn apply_deltas(&mut self, account: &AccountId, deltas: &[PositionDelta]) -> Result<()> {
        let mut net: BTreeMap<&AssetId, i128> = BTreeMap::new();
        for delta in deltas {
            let slot = net.entry(&delta.asset).or_insert(0);
            *slot = slot
                .checked_add(delta.amount)
                .ok_or(VaultError::ArithmeticOverflow("net position delta"))?;
        }

        for (asset, change) in &net {
            if *change < 0 {
                let available = self.balance(account, asset);
                let requested = change.unsigned_abs();
                if available < requested {
                    return Err(VaultError::InsufficientBalance {
                        account: account.clone(),
                        asset: (*asset).clone(),
                        available,
                        requested,
                    });
                }
            }
        }

        for (asset, change) in net {
            if change >= 0 {
                self.credit(account, asset, change as u128)?;
            } else {
                self.debit(account, asset, change.unsigned_abs())?;
            }
        }
        Ok(())
    }
}
