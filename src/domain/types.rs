use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque account identifier.
///
/// Wallets, the lead account, the follower pool and the admin are all addressed this way.
/// Ledgers never hold references to each other, only these ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Asset symbol or token identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Numeric protocol identifier resolved through the adapter registry
pub type ProtocolId = u32;

/// Which ledger an execution ran against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSide {
    Lead,
    Pool,
}

impl ExecutionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionSide::Lead => "lead",
            ExecutionSide::Pool => "pool",
        }
    }
}

impl fmt::Display for ExecutionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a trade instruction asks the venue to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    /// Exchange `asset_in` for `asset_out`
    Swap,
    /// Add collateral to (or open) a position on `market`
    IncreasePosition,
    /// Remove collateral from a position on `market`
    DecreasePosition,
}

/// A Lead-issued trade instruction.
///
/// Amounts are expressed at Lead size. Adapters scale `amount` and `min_amount_out`
/// by the replication ratio themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeInstruction {
    pub action: TradeAction,
    /// Venue market key (e.g. "ETH-PERP")
    pub market: String,
    pub asset_in: AssetId,
    #[serde(default)]
    pub asset_out: Option<AssetId>,
    pub amount: u128,
    #[serde(default)]
    pub min_amount_out: u128,
}

impl TradeInstruction {
    pub fn swap(asset_in: AssetId, asset_out: AssetId, amount: u128, min_amount_out: u128) -> Self {
        Self {
            action: TradeAction::Swap,
            market: format!("{}/{}", asset_in, asset_out),
            asset_in,
            asset_out: Some(asset_out),
            amount,
            min_amount_out,
        }
    }

    pub fn increase(market: &str, collateral: AssetId, amount: u128) -> Self {
        Self {
            action: TradeAction::IncreasePosition,
            market: market.to_string(),
            asset_in: collateral,
            asset_out: None,
            amount,
            min_amount_out: 0,
        }
    }

    pub fn decrease(market: &str, collateral: AssetId, amount: u128) -> Self {
        Self {
            action: TradeAction::DecreasePosition,
            market: market.to_string(),
            asset_in: collateral,
            asset_out: None,
            amount,
            min_amount_out: 0,
        }
    }

    /// Every asset this instruction touches
    pub fn assets(&self) -> Vec<&AssetId> {
        let mut assets = vec![&self.asset_in];
        if let Some(out) = &self.asset_out {
            assets.push(out);
        }
        assets
    }
}

/// Signed balance change reported by a venue for one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDelta {
    pub asset: AssetId,
    pub amount: i128,
}

impl PositionDelta {
    pub fn credit(asset: AssetId, amount: u128) -> Self {
        Self {
            asset,
            amount: amount as i128,
        }
    }

    pub fn debit(asset: AssetId, amount: u128) -> Self {
        Self {
            asset,
            amount: -(amount as i128),
        }
    }
}

/// Result of one venue call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub deltas: Vec<PositionDelta>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ExecutionReport {
    pub fn filled(deltas: Vec<PositionDelta>) -> Self {
        Self {
            success: true,
            deltas,
            message: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            deltas: Vec::new(),
            message: Some(reason.into()),
        }
    }
}

/// An open venue position as observed by the adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub market: String,
    pub collateral: AssetId,
    pub size: u128,
}

impl OpenPosition {
    pub fn is_open(&self) -> bool {
        self.size > 0
    }
}
