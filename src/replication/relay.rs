use tracing::{debug, warn};

use crate::domain::math::{mul_div, PRECISION};
use crate::domain::{
    AccountId, ExecutionReport, ExecutionSide, ProtocolId, TradeAction, TradeInstruction,
};
use crate::error::{Result, VaultError};
use crate::exchange::AdapterGateway;
use crate::ledger::AssetBook;

/// Pool-to-lead scaling factor, 1e18 fixed point.
///
/// `None` means replication is skipped: the lead holds nothing, or the pool is too small
/// for the ratio to register at 1e18 precision.
pub fn compute_ratio(pool_value: u128, lead_value: u128) -> Result<Option<u128>> {
    if lead_value == 0 {
        return Ok(None);
    }
    let ratio = mul_div(pool_value, PRECISION, lead_value)?;
    Ok((ratio > 0).then_some(ratio))
}

/// Fail unless `account` can pay what `instruction` spends at `ratio`, beyond `reserved`.
///
/// Swaps and position increases spend `asset_in`; decreases spend nothing.
pub fn ensure_funded(
    book: &AssetBook,
    account: &AccountId,
    instruction: &TradeInstruction,
    ratio: u128,
    reserved: u128,
) -> Result<()> {
    match instruction.action {
        TradeAction::DecreasePosition => Ok(()),
        TradeAction::Swap | TradeAction::IncreasePosition => {
            let amount = mul_div(instruction.amount, ratio, PRECISION)?;
            book.ensure_available(account, &instruction.asset_in, amount, reserved)
        }
    }
}

/// A successful venue execution on one side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub side: ExecutionSide,
    pub protocol: ProtocolId,
    pub ratio: u128,
    pub report: ExecutionReport,
}

/// Run `instruction` for `account` at `ratio`.
///
/// Venue errors and rejected reports both surface as `AdapterOperationFailed` tagged with
/// `side`. Deltas are returned, not applied.
pub async fn execute_on(
    adapter: &dyn AdapterGateway,
    side: ExecutionSide,
    protocol: ProtocolId,
    account: &AccountId,
    instruction: &TradeInstruction,
    ratio: u128,
) -> Result<ExecutionOutcome> {
    debug!(
        "Executing {:?} {} on {} side via {} (protocol {}, ratio {})",
        instruction.action,
        instruction.market,
        side,
        adapter.venue(),
        protocol,
        ratio
    );

    let report = match adapter.execute(account, instruction, ratio).await {
        Ok(report) => report,
        Err(e) => {
            warn!("{} side execution errored on protocol {}: {}", side, protocol, e);
            return Err(VaultError::AdapterOperationFailed {
                side,
                protocol,
                reason: e.to_string(),
            });
        }
    };

    if !report.success {
        let reason = report
            .message
            .clone()
            .unwrap_or_else(|| "venue rejected the instruction".to_string());
        warn!("{} side execution rejected on protocol {}: {}", side, protocol, reason);
        return Err(VaultError::AdapterOperationFailed {
            side,
            protocol,
            reason,
        });
    }

    Ok(ExecutionOutcome {
        side,
        protocol,
        ratio,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperAdapter;

    #[test]
    fn test_ratio_is_pool_over_lead() {
        assert_eq!(compute_ratio(50, 100).unwrap(), Some(PRECISION / 2));
        assert_eq!(compute_ratio(300, 100).unwrap(), Some(3 * PRECISION));
    }

    #[test]
    fn test_ratio_skips_empty_lead_or_dust_pool() {
        assert_eq!(compute_ratio(100, 0).unwrap(), None);
        assert_eq!(compute_ratio(0, 100).unwrap(), None);
        // 1 / 1e19 is below 1e-18 and truncates to zero
        assert_eq!(compute_ratio(1, 10 * PRECISION).unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejection_is_tagged_with_side() {
        let venue = PaperAdapter::new("paper");
        let pool = AccountId::new("pool");
        venue.reject_account(&pool, true).await;

        let instruction = TradeInstruction::increase("ETH-PERP", "USDC".into(), 10);
        let err = execute_on(&venue, ExecutionSide::Pool, 3, &pool, &instruction, PRECISION)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            VaultError::AdapterOperationFailed {
                side: ExecutionSide::Pool,
                protocol: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_funding_is_checked_at_scaled_size() {
        let mut book = AssetBook::new();
        let pool = AccountId::new("pool");
        book.credit(&pool, &"USDC".into(), 50).unwrap();

        let increase = TradeInstruction::increase("ETH-PERP", "USDC".into(), 100);
        assert!(ensure_funded(&book, &pool, &increase, PRECISION / 2, 0).is_ok());
        assert!(matches!(
            ensure_funded(&book, &pool, &increase, PRECISION, 0),
            Err(VaultError::InsufficientBalance { requested: 100, .. })
        ));

        // Closing collateral spends nothing
        let decrease = TradeInstruction::decrease("ETH-PERP", "USDC".into(), 1_000);
        assert!(ensure_funded(&book, &pool, &decrease, PRECISION, 0).is_ok());
    }
}
