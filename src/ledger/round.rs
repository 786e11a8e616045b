//! Round Ledger
//!
//! Round counter plus the capital that wants to move before the next settlement.
//! The lead account uses it directly; the pool embeds one for its round and pending flows
//! (deposits in asset units, withdrawals in shares).

use serde::{Deserialize, Serialize};

use crate::domain::math::checked_add;
use crate::error::{Result, VaultError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundLedger {
    pub current_round: u64,
    pub cumulative_pending_deposits: u128,
    pub cumulative_pending_withdrawals: u128,
    /// Balance recorded at the last settlement
    pub after_round_balance: u128,
}

/// The lead account's ledger
pub type LeadLedger = RoundLedger;

impl RoundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_deposit(&mut self, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.cumulative_pending_deposits =
            checked_add(self.cumulative_pending_deposits, amount, "pending deposits")?;
        Ok(())
    }

    pub fn record_withdraw_request(&mut self, amount: u128) -> Result<()> {
        self.ensure_withdrawable()?;
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.cumulative_pending_withdrawals =
            checked_add(self.cumulative_pending_withdrawals, amount, "pending withdrawals")?;
        Ok(())
    }

    /// Withdrawals are only accepted once the first round has settled
    pub fn ensure_withdrawable(&self) -> Result<()> {
        if self.current_round == 0 {
            return Err(VaultError::InvalidRound(
                "withdrawals are not accepted before the first round settles".to_string(),
            ));
        }
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.cumulative_pending_deposits > 0 || self.cumulative_pending_withdrawals > 0
    }

    /// Rollover needs at least one paired ledger with pending flows
    pub fn ensure_pending(ledgers: &[&RoundLedger]) -> Result<()> {
        if ledgers.iter().any(|l| l.has_pending()) {
            Ok(())
        } else {
            Err(VaultError::InvalidRollover)
        }
    }

    /// Close the current round. Returns the round that was closed.
    pub fn advance(&mut self, after_round_balance: u128) -> u64 {
        let closed = self.current_round;
        self.current_round += 1;
        self.cumulative_pending_deposits = 0;
        self.cumulative_pending_withdrawals = 0;
        self.after_round_balance = after_round_balance;
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_requires_amount() {
        let mut ledger = RoundLedger::new();
        assert!(matches!(ledger.record_deposit(0), Err(VaultError::ZeroAmount)));
        ledger.record_deposit(10).unwrap();
        ledger.record_deposit(5).unwrap();
        assert_eq!(ledger.cumulative_pending_deposits, 15);
    }

    #[test]
    fn test_withdraw_before_first_round_fails() {
        let mut ledger = RoundLedger::new();
        assert!(matches!(
            ledger.record_withdraw_request(10),
            Err(VaultError::InvalidRound(_))
        ));

        ledger.record_deposit(10).unwrap();
        ledger.advance(10);
        assert!(matches!(
            ledger.record_withdraw_request(0),
            Err(VaultError::ZeroAmount)
        ));
        ledger.record_withdraw_request(4).unwrap();
        assert_eq!(ledger.cumulative_pending_withdrawals, 4);
    }

    #[test]
    fn test_advance_resets_pending() {
        let mut ledger = RoundLedger::new();
        ledger.record_deposit(10).unwrap();
        let closed = ledger.advance(10);

        assert_eq!(closed, 0);
        assert_eq!(ledger.current_round, 1);
        assert!(!ledger.has_pending());
        assert_eq!(ledger.after_round_balance, 10);
    }

    #[test]
    fn test_ensure_pending_across_paired_ledgers() {
        let lead = RoundLedger::new();
        let mut pool = RoundLedger::new();
        assert!(matches!(
            RoundLedger::ensure_pending(&[&lead, &pool]),
            Err(VaultError::InvalidRollover)
        ));

        pool.record_deposit(1).unwrap();
        assert!(RoundLedger::ensure_pending(&[&lead, &pool]).is_ok());
    }
}
