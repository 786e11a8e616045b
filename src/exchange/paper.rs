//! Paper venue
//!
//! Fills swaps at configured rates and tracks collateral positions in memory. Used by
//! `copyvault simulate` and throughout the test suite.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::AdapterGateway;
use crate::domain::math::{checked_add, mul_div, PRECISION};
use crate::domain::{
    AccountId, AssetId, ExecutionReport, OpenPosition, PositionDelta, TradeAction,
    TradeInstruction,
};
use crate::error::Result;

#[derive(Default)]
struct PaperBook {
    /// account -> market -> position
    positions: HashMap<AccountId, BTreeMap<String, OpenPosition>>,
    /// (in, out) -> units of out per unit of in, 1e18
    rates: HashMap<(AssetId, AssetId), u128>,
    /// market -> minimum slippage a close must tolerate
    required_slippage_bps: HashMap<String, u32>,
    rejecting: HashSet<AccountId>,
}

pub struct PaperAdapter {
    venue: String,
    book: Mutex<PaperBook>,
}

impl PaperAdapter {
    pub fn new(venue: &str) -> Self {
        Self {
            venue: venue.to_string(),
            book: Mutex::new(PaperBook::default()),
        }
    }

    pub async fn set_rate(&self, asset_in: &AssetId, asset_out: &AssetId, rate: u128) {
        self.book
            .lock()
            .await
            .rates
            .insert((asset_in.clone(), asset_out.clone()), rate);
    }

    /// Closes on `market` only go through at `bps` tolerance or above
    pub async fn set_required_slippage(&self, market: &str, bps: u32) {
        self.book
            .lock()
            .await
            .required_slippage_bps
            .insert(market.to_string(), bps);
    }

    /// Reject every execution for `account` until cleared
    pub async fn reject_account(&self, account: &AccountId, rejecting: bool) {
        let mut book = self.book.lock().await;
        if rejecting {
            book.rejecting.insert(account.clone());
        } else {
            book.rejecting.remove(account);
        }
    }

    pub async fn position(&self, account: &AccountId, market: &str) -> Option<OpenPosition> {
        self.book
            .lock()
            .await
            .positions
            .get(account)
            .and_then(|markets| markets.get(market))
            .cloned()
    }

    fn fill_swap(book: &PaperBook, instruction: &TradeInstruction, amount: u128, min_out: u128) -> Result<ExecutionReport> {
        let Some(asset_out) = instruction.asset_out.clone() else {
            return Ok(ExecutionReport::rejected("swap without output asset"));
        };
        let Some(rate) = book
            .rates
            .get(&(instruction.asset_in.clone(), asset_out.clone()))
            .copied()
        else {
            return Ok(ExecutionReport::rejected(format!(
                "no route {} -> {}",
                instruction.asset_in, asset_out
            )));
        };

        let out = mul_div(amount, rate, PRECISION)?;
        if out < min_out {
            return Ok(ExecutionReport::rejected(format!(
                "output {} below minimum {}",
                out, min_out
            )));
        }
        Ok(ExecutionReport::filled(vec![
            PositionDelta::debit(instruction.asset_in.clone(), amount),
            PositionDelta::credit(asset_out, out),
        ]))
    }
}

#[async_trait]
impl AdapterGateway for PaperAdapter {
    fn venue(&self) -> &str {
        &self.venue
    }

    async fn execute(
        &self,
        account: &AccountId,
        instruction: &TradeInstruction,
        ratio: u128,
    ) -> Result<ExecutionReport> {
        let mut book = self.book.lock().await;
        if book.rejecting.contains(account) {
            warn!("[{}] rejecting {} for {}", self.venue, instruction.market, account);
            return Ok(ExecutionReport::rejected("venue rejected the order"));
        }

        let amount = mul_div(instruction.amount, ratio, PRECISION)?;
        if amount == 0 {
            return Ok(ExecutionReport::rejected("scaled amount is zero"));
        }
        let min_out = mul_div(instruction.min_amount_out, ratio, PRECISION)?;
        debug!(
            "[{}] {:?} {} for {}: amount={} (ratio {})",
            self.venue, instruction.action, instruction.market, account, amount, ratio
        );

        match instruction.action {
            TradeAction::Swap => Self::fill_swap(&book, instruction, amount, min_out),
            TradeAction::IncreasePosition => {
                let position = book
                    .positions
                    .entry(account.clone())
                    .or_default()
                    .entry(instruction.market.clone())
                    .or_insert_with(|| OpenPosition {
                        market: instruction.market.clone(),
                        collateral: instruction.asset_in.clone(),
                        size: 0,
                    });
                position.size = checked_add(position.size, amount, "paper position size")?;
                Ok(ExecutionReport::filled(vec![PositionDelta::debit(
                    instruction.asset_in.clone(),
                    amount,
                )]))
            }
            TradeAction::DecreasePosition => {
                let Some(position) = book
                    .positions
                    .get_mut(account)
                    .and_then(|markets| markets.get_mut(&instruction.market))
                    .filter(|p| p.is_open())
                else {
                    return Ok(ExecutionReport::rejected(format!(
                        "no open position on {}",
                        instruction.market
                    )));
                };
                let released = amount.min(position.size);
                position.size -= released;
                Ok(ExecutionReport::filled(vec![PositionDelta::credit(
                    position.collateral.clone(),
                    released,
                )]))
            }
        }
    }

    async fn open_positions(&self, account: &AccountId) -> Result<Vec<OpenPosition>> {
        Ok(self
            .book
            .lock()
            .await
            .positions
            .get(account)
            .map(|markets| markets.values().filter(|p| p.is_open()).cloned().collect())
            .unwrap_or_default())
    }

    async fn close_position(
        &self,
        account: &AccountId,
        position: &OpenPosition,
        slippage_bps: u32,
    ) -> Result<ExecutionReport> {
        let mut book = self.book.lock().await;
        let required = book
            .required_slippage_bps
            .get(&position.market)
            .copied()
            .unwrap_or(0);
        if slippage_bps < required {
            return Ok(ExecutionReport::rejected(format!(
                "slippage {} bps below required {} bps",
                slippage_bps, required
            )));
        }

        let Some(held) = book
            .positions
            .get_mut(account)
            .and_then(|markets| markets.get_mut(&position.market))
        else {
            return Ok(ExecutionReport::rejected(format!(
                "no position on {}",
                position.market
            )));
        };
        let released = held.size;
        held.size = 0;
        Ok(ExecutionReport::filled(vec![PositionDelta::credit(
            held.collateral.clone(),
            released,
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> AccountId {
        AccountId::new("pool")
    }

    #[tokio::test]
    async fn test_swap_scales_by_ratio() {
        let venue = PaperAdapter::new("paper");
        let usdc = AssetId::new("USDC");
        let weth = AssetId::new("WETH");
        venue.set_rate(&usdc, &weth, 2 * PRECISION).await;

        let instruction = TradeInstruction::swap(usdc.clone(), weth.clone(), 100, 150);
        let report = venue.execute(&pool(), &instruction, PRECISION / 2).await.unwrap();

        assert!(report.success);
        assert_eq!(
            report.deltas,
            vec![PositionDelta::debit(usdc, 50), PositionDelta::credit(weth, 100)]
        );
    }

    #[tokio::test]
    async fn test_swap_without_route_is_rejected() {
        let venue = PaperAdapter::new("paper");
        let instruction = TradeInstruction::swap("USDC".into(), "WBTC".into(), 100, 0);
        let report = venue.execute(&pool(), &instruction, PRECISION).await.unwrap();
        assert!(!report.success);
    }

    #[tokio::test]
    async fn test_close_respects_required_slippage() {
        let venue = PaperAdapter::new("paper");
        let instruction = TradeInstruction::increase("ETH-PERP", "USDC".into(), 40);
        venue.execute(&pool(), &instruction, PRECISION).await.unwrap();
        venue.set_required_slippage("ETH-PERP", 200).await;

        let open = venue.open_positions(&pool()).await.unwrap();
        assert_eq!(open.len(), 1);

        let report = venue.close_position(&pool(), &open[0], 150).await.unwrap();
        assert!(!report.success);
        assert_eq!(venue.open_positions(&pool()).await.unwrap().len(), 1);

        let report = venue.close_position(&pool(), &open[0], 250).await.unwrap();
        assert!(report.success);
        assert_eq!(report.deltas, vec![PositionDelta::credit("USDC".into(), 40)]);
        assert!(venue.open_positions(&pool()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_position_size_overflow_is_an_error() {
        let venue = PaperAdapter::new("paper");
        let full = TradeInstruction::increase("ETH-PERP", "USDC".into(), u128::MAX);
        venue.execute(&pool(), &full, PRECISION).await.unwrap();

        let one_more = TradeInstruction::increase("ETH-PERP", "USDC".into(), 1);
        assert!(matches!(
            venue.execute(&pool(), &one_more, PRECISION).await,
            Err(crate::error::VaultError::ArithmeticOverflow(_))
        ));
        assert_eq!(
            venue.position(&pool(), "ETH-PERP").await.map(|p| p.size),
            Some(u128::MAX)
        );
    }
}
