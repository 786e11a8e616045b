use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::math::{assets_for_shares, checked_add, shares_for_assets};
use crate::error::{Result, VaultError};

/// Per-depositor bookkeeping.
///
/// Pending amounts belong to `round`; once that round has settled they can be converted
/// at its recorded share price. Records are never deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// Last round this record was touched
    pub round: u64,
    pub pending_deposit_assets: u128,
    pub unclaimed_deposit_shares: u128,
    pub pending_withdraw_shares: u128,
    pub unclaimed_withdraw_assets: u128,
}

impl ParticipantRecord {
    pub fn new(round: u64) -> Self {
        Self {
            round,
            ..Default::default()
        }
    }

    pub fn is_stale(&self, current_round: u64) -> bool {
        self.round < current_round
    }

    pub fn has_claimable(&self) -> bool {
        self.unclaimed_deposit_shares > 0 || self.unclaimed_withdraw_assets > 0
    }

    /// Convert flows recorded under a settled round into claimable balances.
    ///
    /// Returns `true` when the record changed.
    pub fn roll_forward(
        &mut self,
        current_round: u64,
        price_per_share: &BTreeMap<u64, u128>,
    ) -> Result<bool> {
        if !self.is_stale(current_round) {
            return Ok(false);
        }

        let price = *price_per_share.get(&self.round).ok_or_else(|| {
            VaultError::InvalidState(format!("no share price recorded for round {}", self.round))
        })?;

        if self.pending_deposit_assets > 0 {
            let shares = shares_for_assets(self.pending_deposit_assets, price)?;
            self.unclaimed_deposit_shares =
                checked_add(self.unclaimed_deposit_shares, shares, "unclaimed deposit shares")?;
            self.pending_deposit_assets = 0;
        }

        if self.pending_withdraw_shares > 0 {
            let assets = assets_for_shares(self.pending_withdraw_shares, price)?;
            self.unclaimed_withdraw_assets =
                checked_add(self.unclaimed_withdraw_assets, assets, "unclaimed withdraw assets")?;
            self.pending_withdraw_shares = 0;
        }

        self.round = current_round;
        Ok(true)
    }
}
