//! Pool Accounting
//!
//! NAV-driven share issuance and redemption for the follower pool.
//!
//! Participants queue deposits (assets) and withdrawals (shares) during a round. At
//! settlement the pool is valued, a performance fee is skimmed from any profit, a share
//! price is fixed for the closed round and every queued flow is converted at that price.
//! Participants realize their conversions lazily through [`ParticipantRecord::roll_forward`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::participant::ParticipantRecord;
use crate::domain::math::{
    assets_for_shares, assets_for_value, checked_add, checked_sub, mul_div, shares_for_assets,
    value_of, PRECISION,
};
use crate::domain::AccountId;
use crate::error::{Result, VaultError};
use crate::ledger::RoundLedger;

/// Global pool ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLedger {
    /// Round counter; pending deposits are asset units, pending withdrawals are shares
    pub round: RoundLedger,
    /// Asset amount converted from burned shares and not yet claimed
    pub processed_withdraw_assets: u128,
    pub total_share_supply: u128,
    /// Minted shares held by the pool until their owners claim them
    pub custody_shares: u128,
    pub accrued_performance_fee_assets: u128,
    /// Share price fixed when each round closed, keyed by the closed round
    pub price_per_share: BTreeMap<u64, u128>,
}

impl PoolLedger {
    pub fn current_round(&self) -> u64 {
        self.round.current_round
    }

    pub fn pending_deposit_assets(&self) -> u128 {
        self.round.cumulative_pending_deposits
    }

    pub fn pending_withdraw_shares(&self) -> u128 {
        self.round.cumulative_pending_withdrawals
    }

    pub fn after_round_balance(&self) -> u128 {
        self.round.after_round_balance
    }

    pub fn latest_price_per_share(&self) -> Option<u128> {
        self.price_per_share.values().next_back().copied()
    }
}

/// Values observed at settlement time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementInputs {
    /// Oracle price of one underlying unit
    pub unit_price: u128,
    /// Oracle valuation of everything the pool holds
    pub pool_valuation: u128,
    /// Pool's liquid underlying balance
    pub underlying_balance: u128,
}

/// What one settlement did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    /// The round that was closed
    pub round: u64,
    pub price_per_share: u128,
    pub shares_minted: u128,
    pub shares_burned: u128,
    /// Trading-capital value change since the previous settlement (signed)
    pub profit_value: i128,
    pub fee_assets: u128,
    pub deposits_processed: u128,
    pub withdraw_assets: u128,
    pub after_round_balance: u128,
}

/// Net asset value after the fee branch ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NavBreakdown {
    profit_value: i128,
    fee_assets: u128,
    nav_assets: u128,
}

/// Amounts released by a claim
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimAmounts {
    pub shares: u128,
    pub assets: u128,
}

impl ClaimAmounts {
    pub fn is_empty(&self) -> bool {
        self.shares == 0 && self.assets == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAccounting {
    pub ledger: PoolLedger,
    participants: BTreeMap<AccountId, ParticipantRecord>,
    share_balances: BTreeMap<AccountId, u128>,
}

fn to_signed(value: u128) -> Result<i128> {
    i128::try_from(value).map_err(|_| VaultError::ArithmeticOverflow("value exceeds i128"))
}

impl PoolAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, participant: &AccountId) -> Option<&ParticipantRecord> {
        self.participants.get(participant)
    }

    pub fn participants(&self) -> impl Iterator<Item = (&AccountId, &ParticipantRecord)> {
        self.participants.iter()
    }

    pub fn is_participant(&self, account: &AccountId) -> bool {
        self.participants.contains_key(account)
    }

    pub fn share_balance(&self, account: &AccountId) -> u128 {
        self.share_balances.get(account).copied().unwrap_or(0)
    }

    /// `total_share_supply == Σ balances + custody + pending withdrawals`
    pub fn check_share_conservation(&self) -> bool {
        let held: u128 = self.share_balances.values().sum();
        held + self.ledger.custody_shares + self.ledger.pending_withdraw_shares()
            == self.ledger.total_share_supply
    }

    fn rolled_record(&mut self, participant: &AccountId) -> Result<&mut ParticipantRecord> {
        let current_round = self.ledger.current_round();
        let record = self
            .participants
            .entry(participant.clone())
            .or_insert_with(|| ParticipantRecord::new(current_round));
        record.roll_forward(current_round, &self.ledger.price_per_share)?;
        Ok(record)
    }

    /// Projection of a participant's record rolled to the current round
    fn projected_record(&self, participant: &AccountId) -> Result<ParticipantRecord> {
        let current_round = self.ledger.current_round();
        let mut record = self
            .participants
            .get(participant)
            .cloned()
            .unwrap_or_else(|| ParticipantRecord::new(current_round));
        record.roll_forward(current_round, &self.ledger.price_per_share)?;
        Ok(record)
    }

    // ==================== Participant flows ====================

    /// Queue `amount` underlying for the next settlement
    pub fn deposit(&mut self, participant: &AccountId, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let record = self.rolled_record(participant)?;
        record.pending_deposit_assets =
            checked_add(record.pending_deposit_assets, amount, "participant pending deposit")?;
        self.ledger.round.record_deposit(amount)
    }

    /// Queue `shares` for redemption at the next settlement.
    ///
    /// Unclaimed deposit shares are spent before the participant's claimed balance.
    pub fn withdraw_request(&mut self, participant: &AccountId, shares: u128) -> Result<()> {
        self.ledger.round.ensure_withdrawable()?;
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        if !self.participants.contains_key(participant) {
            return Err(VaultError::InsufficientShares {
                available: 0,
                requested: shares,
            });
        }

        let balance = self.share_balance(participant);
        let record = self.rolled_record(participant)?;
        let available = checked_add(balance, record.unclaimed_deposit_shares, "available shares")?;
        if shares > available {
            return Err(VaultError::InsufficientShares {
                available,
                requested: shares,
            });
        }

        let from_custody = shares.min(record.unclaimed_deposit_shares);
        let from_balance = shares - from_custody;
        record.unclaimed_deposit_shares -= from_custody;
        record.pending_withdraw_shares =
            checked_add(record.pending_withdraw_shares, shares, "participant pending withdraw")?;

        self.ledger.custody_shares =
            checked_sub(self.ledger.custody_shares, from_custody, "custody shares")?;
        if from_balance > 0 {
            let slot = self.share_balances.entry(participant.clone()).or_insert(0);
            *slot -= from_balance;
        }
        self.ledger.round.record_withdraw_request(shares)
    }

    /// Release everything claimable. The caller moves `assets` out of the pool's book.
    pub fn claim(&mut self, participant: &AccountId) -> Result<ClaimAmounts> {
        if !self.participants.contains_key(participant) {
            return Ok(ClaimAmounts::default());
        }

        let record = self.rolled_record(participant)?;
        let amounts = ClaimAmounts {
            shares: record.unclaimed_deposit_shares,
            assets: record.unclaimed_withdraw_assets,
        };
        record.unclaimed_deposit_shares = 0;
        record.unclaimed_withdraw_assets = 0;

        if amounts.shares > 0 {
            self.ledger.custody_shares =
                checked_sub(self.ledger.custody_shares, amounts.shares, "custody shares")?;
            let slot = self.share_balances.entry(participant.clone()).or_insert(0);
            *slot = checked_add(*slot, amounts.shares, "share balance")?;
        }
        if amounts.assets > 0 {
            self.ledger.processed_withdraw_assets = checked_sub(
                self.ledger.processed_withdraw_assets,
                amounts.assets,
                "processed withdraw assets",
            )?;
        }
        Ok(amounts)
    }

    /// Shares a claim would release now
    pub fn preview_shares(&self, participant: &AccountId) -> Result<u128> {
        Ok(self.projected_record(participant)?.unclaimed_deposit_shares)
    }

    /// Assets a claim would release now
    pub fn preview_assets(&self, participant: &AccountId) -> Result<u128> {
        Ok(self.projected_record(participant)?.unclaimed_withdraw_assets)
    }

    /// Asset value of claimed plus claimable shares at the latest settled price
    pub fn share_value(&self, participant: &AccountId) -> Result<u128> {
        let Some(price) = self.ledger.latest_price_per_share() else {
            return Ok(0);
        };
        let shares = checked_add(
            self.share_balance(participant),
            self.preview_shares(participant)?,
            "participant shares",
        )?;
        assets_for_shares(shares, price)
    }

    /// Hand accrued fees to the caller and zero the accrual
    pub fn take_accrued_fees(&mut self) -> u128 {
        std::mem::take(&mut self.ledger.accrued_performance_fee_assets)
    }

    // ==================== Settlement ====================

    /// Close the current round.
    ///
    /// Mutates `self` only after every check has passed; on error the pool is unchanged.
    pub fn settle(&mut self, inputs: SettlementInputs, fee_rate: u128) -> Result<SettlementOutcome> {
        let price = inputs.unit_price;
        if price == 0 {
            return Err(VaultError::ArithmeticOverflow("zero unit price"));
        }
        let ledger = &self.ledger;

        let reserved_assets = checked_add(
            checked_add(
                ledger.pending_deposit_assets(),
                ledger.processed_withdraw_assets,
                "reserved assets",
            )?,
            ledger.accrued_performance_fee_assets,
            "reserved assets",
        )?;
        let reserved_value = value_of(reserved_assets, price)?;
        let current_value = inputs.pool_valuation.saturating_sub(reserved_value);
        let previous_value = value_of(ledger.after_round_balance(), price)?;

        let nav = if current_value > previous_value {
            Self::nav_after_profit(current_value, previous_value, price, fee_rate)?
        } else {
            Self::nav_after_loss(current_value, previous_value, price)?
        };

        let supply = ledger.total_share_supply;
        let price_per_share = if supply == 0 {
            PRECISION
        } else {
            let pps = mul_div(nav.nav_assets, PRECISION, supply)?;
            if pps == 0 {
                return Err(VaultError::ZeroSharePrice { supply });
            }
            pps
        };

        let shares_burned = ledger.pending_withdraw_shares();
        let deposits_processed = ledger.pending_deposit_assets();
        let (shares_minted, withdraw_assets) = self.convert_round_flows(price_per_share)?;

        let processed_withdraw_assets = checked_add(
            ledger.processed_withdraw_assets,
            withdraw_assets,
            "processed withdraw assets",
        )?;
        let need = checked_add(processed_withdraw_assets, deposits_processed, "reserve need")?;
        if inputs.underlying_balance < need {
            return Err(VaultError::NotEnoughReservedAssets {
                have: inputs.underlying_balance,
                need,
            });
        }

        let total_share_supply = checked_add(
            checked_sub(supply, shares_burned, "share supply")?,
            shares_minted,
            "share supply",
        )?;
        let custody_shares = checked_add(ledger.custody_shares, shares_minted, "custody shares")?;
        let accrued = checked_add(
            ledger.accrued_performance_fee_assets,
            nav.fee_assets,
            "accrued fees",
        )?;
        let after_round_balance = checked_add(
            nav.nav_assets.saturating_sub(withdraw_assets),
            deposits_processed,
            "after round balance",
        )?;

        debug!(
            "Pool settlement: price={} current_value={} previous_value={} profit={} fee_assets={} pps={}",
            price, current_value, previous_value, nav.profit_value, nav.fee_assets, price_per_share
        );

        // Commit
        let ledger = &mut self.ledger;
        ledger.processed_withdraw_assets = processed_withdraw_assets;
        ledger.total_share_supply = total_share_supply;
        ledger.custody_shares = custody_shares;
        ledger.accrued_performance_fee_assets = accrued;
        let round = ledger.round.advance(after_round_balance);
        ledger.price_per_share.insert(round, price_per_share);

        Ok(SettlementOutcome {
            round,
            price_per_share,
            shares_minted,
            shares_burned,
            profit_value: nav.profit_value,
            fee_assets: nav.fee_assets,
            deposits_processed,
            withdraw_assets,
            after_round_balance,
        })
    }

    /// Convert the current round's queued flows record by record.
    ///
    /// The totals are sums of exactly what each record will claim after rolling forward,
    /// so no rounding remainder is stranded in custody or in the withdrawal reserve.
    fn convert_round_flows(&self, price_per_share: u128) -> Result<(u128, u128)> {
        let current_round = self.ledger.current_round();
        let mut deposits = 0u128;
        let mut withdrawals = 0u128;
        let mut shares_minted = 0u128;
        let mut withdraw_assets = 0u128;

        for record in self.participants.values().filter(|r| r.round == current_round) {
            deposits = checked_add(deposits, record.pending_deposit_assets, "round deposits")?;
            withdrawals =
                checked_add(withdrawals, record.pending_withdraw_shares, "round withdrawals")?;
            shares_minted = checked_add(
                shares_minted,
                shares_for_assets(record.pending_deposit_assets, price_per_share)?,
                "shares minted",
            )?;
            withdraw_assets = checked_add(
                withdraw_assets,
                assets_for_shares(record.pending_withdraw_shares, price_per_share)?,
                "withdraw assets",
            )?;
        }

        if deposits != self.ledger.pending_deposit_assets()
            || withdrawals != self.ledger.pending_withdraw_shares()
        {
            return Err(VaultError::InvalidState(format!(
                "participant records hold {} assets / {} shares pending, round ledger {} / {}",
                deposits,
                withdrawals,
                self.ledger.pending_deposit_assets(),
                self.ledger.pending_withdraw_shares()
            )));
        }
        Ok((shares_minted, withdraw_assets))
    }

    /// Profit round: the fee is converted to assets on its own and subtracted from the gross
    /// NAV assets, so its truncation leaves the rounding unit with participants.
    fn nav_after_profit(
        current_value: u128,
        previous_value: u128,
        price: u128,
        fee_rate: u128,
    ) -> Result<NavBreakdown> {
        let profit = current_value - previous_value;
        let fee_value = mul_div(profit, fee_rate, PRECISION)?;
        let fee_assets = assets_for_value(fee_value, price)?;
        let gross_assets = assets_for_value(current_value, price)?;
        let nav_assets = checked_sub(gross_assets, fee_assets, "nav after fee")?;

        Ok(NavBreakdown {
            profit_value: to_signed(profit)?,
            fee_assets,
            nav_assets,
        })
    }

    /// Loss or flat round: no fee; NAV converted to assets in a single division.
    fn nav_after_loss(current_value: u128, previous_value: u128, price: u128) -> Result<NavBreakdown> {
        let profit_value = to_signed(current_value)? - to_signed(previous_value)?;
        Ok(NavBreakdown {
            profit_value,
            fee_assets: 0,
            nav_assets: assets_for_value(current_value, price)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEE_10_PCT: u128 = PRECISION / 10;

    fn alice() -> AccountId {
        AccountId::new("alice")
    }

    fn bob() -> AccountId {
        AccountId::new("bob")
    }

    fn inputs(valuation: u128, balance: u128) -> SettlementInputs {
        SettlementInputs {
            unit_price: PRECISION,
            pool_valuation: valuation,
            underlying_balance: balance,
        }
    }

    #[test]
    fn test_first_round_seeds_one_to_one() {
        let mut pool = PoolAccounting::new();
        pool.deposit(&alice(), 100).unwrap();

        let outcome = pool.settle(inputs(100, 100), FEE_10_PCT).unwrap();
        assert_eq!(outcome.round, 0);
        assert_eq!(outcome.price_per_share, PRECISION);
        assert_eq!(outcome.shares_minted, 100);
        assert_eq!(outcome.fee_assets, 0);
        assert_eq!(pool.ledger.current_round(), 1);
        assert_eq!(pool.preview_shares(&alice()).unwrap(), 100);
        assert!(pool.check_share_conservation());

        let claimed = pool.claim(&alice()).unwrap();
        assert_eq!(claimed.shares, 100);
        assert_eq!(pool.share_balance(&alice()), 100);
        assert!(pool.check_share_conservation());
    }

    #[test]
    fn test_profit_round_accrues_fee() {
        let mut pool = PoolAccounting::new();
        pool.deposit(&alice(), 30_000_000).unwrap();
        pool.deposit(&bob(), 40_000_000).unwrap();
        pool.settle(inputs(70_000_000, 70_000_000), FEE_10_PCT).unwrap();

        // +50 units of trading value, plus a new deposit so the round has flow
        pool.deposit(&alice(), 1_000_000).unwrap();
        let outcome = pool
            .settle(inputs(121_000_000, 121_000_000), FEE_10_PCT)
            .unwrap();

        assert_eq!(outcome.profit_value, 50_000_000);
        assert_eq!(outcome.fee_assets, 5_000_000);
        assert_eq!(pool.ledger.accrued_performance_fee_assets, 5_000_000);
        assert_eq!(outcome.price_per_share, 1_642_857_142_857_142_857);
    }

    #[test]
    fn test_loss_round_takes_no_fee() {
        let mut pool = PoolAccounting::new();
        pool.deposit(&alice(), 100).unwrap();
        pool.settle(inputs(100, 100), FEE_10_PCT).unwrap();
        pool.claim(&alice()).unwrap();

        pool.withdraw_request(&alice(), 10).unwrap();
        let outcome = pool.settle(inputs(80, 100), FEE_10_PCT).unwrap();

        assert_eq!(outcome.profit_value, -20);
        assert_eq!(outcome.fee_assets, 0);
        assert_eq!(outcome.price_per_share, 8 * PRECISION / 10);
        assert_eq!(outcome.withdraw_assets, 8);
        assert_eq!(pool.ledger.accrued_performance_fee_assets, 0);
        assert_eq!(pool.preview_assets(&alice()).unwrap(), 8);
    }

    #[test]
    fn test_round_flows_leave_no_rounding_remainder() {
        let carol = AccountId::new("carol");
        let dave = AccountId::new("dave");
        let erin = AccountId::new("erin");

        let mut pool = PoolAccounting::new();
        pool.deposit(&alice(), 2).unwrap();
        pool.settle(inputs(2, 2), FEE_10_PCT).unwrap();
        pool.claim(&alice()).unwrap();

        // pps 1.5: each deposit of 2 buys 1 share, the aggregate 6 would have bought 4
        for who in [&carol, &dave, &erin] {
            pool.deposit(who, 2).unwrap();
        }
        let outcome = pool.settle(inputs(9, 9), FEE_10_PCT).unwrap();
        assert_eq!(outcome.price_per_share, 3 * PRECISION / 2);
        assert_eq!(outcome.shares_minted, 3);
        for who in [&carol, &dave, &erin] {
            assert_eq!(pool.claim(who).unwrap().shares, 1);
        }
        assert_eq!(pool.ledger.custody_shares, 0);
        assert!(pool.check_share_conservation());

        // pps 1.8: one share each redeems 1 unit, the aggregate 3 shares would be 5 units
        for who in [&alice(), &carol, &dave] {
            pool.withdraw_request(who, 1).unwrap();
        }
        let outcome = pool.settle(inputs(9, 9), FEE_10_PCT).unwrap();
        assert_eq!(outcome.price_per_share, 9 * PRECISION / 5);
        assert_eq!(outcome.withdraw_assets, 3);
        assert_eq!(pool.ledger.processed_withdraw_assets, 3);
        for who in [&alice(), &carol, &dave] {
            assert_eq!(pool.claim(who).unwrap().assets, 1);
        }
        assert_eq!(pool.ledger.processed_withdraw_assets, 0);
        assert!(pool.check_share_conservation());
    }

    #[test]
    fn test_profit_branch_rounding_favors_participants() {
        // Profit of 7 at 10% is a fee of 0.7 units: it truncates to zero and the whole
        // gross NAV stays with the shares.
        let nav = PoolAccounting::nav_after_profit(107, 100, PRECISION, FEE_10_PCT).unwrap();
        assert_eq!(nav.fee_assets, 0);
        assert_eq!(nav.nav_assets, 107);

        // At a non-unit price both conversions truncate independently
        let price = 3 * PRECISION;
        let nav = PoolAccounting::nav_after_profit(1_000, 700, price, FEE_10_PCT).unwrap();
        assert_eq!(nav.fee_assets, 10); // fee value 30 -> 10 assets
        assert_eq!(nav.nav_assets, 333 - 10);
    }

    #[test]
    fn test_loss_branch_rounding_single_division() {
        let price = 3 * PRECISION;
        let nav = PoolAccounting::nav_after_loss(1_000, 1_200, price).unwrap();
        assert_eq!(nav.profit_value, -200);
        assert_eq!(nav.fee_assets, 0);
        assert_eq!(nav.nav_assets, 333);
    }

    #[test]
    fn test_settlement_fails_without_liquidity_and_leaves_state() {
        let mut pool = PoolAccounting::new();
        pool.deposit(&alice(), 100).unwrap();
        pool.settle(inputs(100, 100), FEE_10_PCT).unwrap();
        pool.claim(&alice()).unwrap();
        pool.withdraw_request(&alice(), 100).unwrap();

        let before = pool.clone();
        let err = pool.settle(inputs(100, 20), FEE_10_PCT).unwrap_err();
        assert!(matches!(
            err,
            VaultError::NotEnoughReservedAssets { have: 20, need: 100 }
        ));
        assert_eq!(pool, before);
    }

    #[test]
    fn test_withdraw_spends_unclaimed_shares_first() {
        let mut pool = PoolAccounting::new();
        pool.deposit(&alice(), 100).unwrap();
        pool.settle(inputs(100, 100), FEE_10_PCT).unwrap();

        // Nothing claimed yet: all 100 shares sit in custody
        pool.withdraw_request(&alice(), 40).unwrap();
        assert_eq!(pool.ledger.custody_shares, 60);
        assert_eq!(pool.share_balance(&alice()), 0);
        assert!(pool.check_share_conservation());

        let err = pool.withdraw_request(&alice(), 61).unwrap_err();
        assert!(matches!(
            err,
            VaultError::InsufficientShares {
                available: 60,
                requested: 61
            }
        ));
    }

    #[test]
    fn test_withdraw_before_first_round() {
        let mut pool = PoolAccounting::new();
        pool.deposit(&alice(), 100).unwrap();
        assert!(matches!(
            pool.withdraw_request(&alice(), 1),
            Err(VaultError::InvalidRound(_))
        ));
    }

    #[test]
    fn test_claim_twice_is_idempotent() {
        let mut pool = PoolAccounting::new();
        pool.deposit(&alice(), 100).unwrap();
        pool.settle(inputs(100, 100), FEE_10_PCT).unwrap();

        pool.claim(&alice()).unwrap();
        let after_first = pool.clone();
        let second = pool.claim(&alice()).unwrap();

        assert!(second.is_empty());
        assert_eq!(pool, after_first);
    }

    #[test]
    fn test_zero_share_price_rejected() {
        let mut pool = PoolAccounting::new();
        pool.deposit(&alice(), 100).unwrap();
        pool.settle(inputs(100, 100), FEE_10_PCT).unwrap();
        pool.deposit(&bob(), 10).unwrap();

        // Trading capital wiped out, only bob's pending deposit is left
        let err = pool.settle(inputs(10, 10), FEE_10_PCT).unwrap_err();
        assert!(matches!(err, VaultError::ZeroSharePrice { supply: 100 }));
    }
}
