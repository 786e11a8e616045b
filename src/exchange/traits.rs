use async_trait::async_trait;

use crate::domain::{AccountId, ExecutionReport, OpenPosition, TradeInstruction};
use crate::error::{Result, VaultError};

fn unsupported(feature: &str, venue: &str) -> VaultError {
    VaultError::Validation(format!(
        "{} is not implemented for venue '{}'",
        feature, venue
    ))
}

/// Execution capability for one venue.
///
/// `execute` receives instructions at Lead size together with a 1e18 ratio and scales them
/// itself. Submissions record intent only; resulting positions are observed later through
/// `open_positions`.
#[async_trait]
pub trait AdapterGateway: Send + Sync {
    fn venue(&self) -> &str;

    async fn execute(
        &self,
        account: &AccountId,
        instruction: &TradeInstruction,
        ratio: u128,
    ) -> Result<ExecutionReport>;

    /// Spot-only venues hold no positions
    async fn open_positions(&self, _account: &AccountId) -> Result<Vec<OpenPosition>> {
        Ok(Vec::new())
    }

    async fn close_position(
        &self,
        _account: &AccountId,
        _position: &OpenPosition,
        _slippage_bps: u32,
    ) -> Result<ExecutionReport> {
        Err(unsupported("close_position", self.venue()))
    }
}
