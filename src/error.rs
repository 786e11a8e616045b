use thiserror::Error;

use crate::domain::{AccountId, AssetId, ExecutionSide, ProtocolId};

/// Main error type for the vault engine
#[derive(Error, Debug)]
pub enum VaultError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Input validation
    #[error("User not allowed: {0}")]
    UserNotAllowed(AccountId),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Asset not allowed: {0}")]
    AssetNotAllowed(AssetId),

    #[error("Invalid protocol: {0}")]
    InvalidProtocol(ProtocolId),

    #[error("Invalid adapter: protocol {0} resolves to no capability")]
    InvalidAdapter(ProtocolId),

    #[error("Insufficient shares: available {available}, requested {requested}")]
    InsufficientShares { available: u128, requested: u128 },

    #[error("Insufficient {asset} balance on {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        account: AccountId,
        asset: AssetId,
        available: u128,
        requested: u128,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    // Invariant violations
    #[error("Invalid round: {0}")]
    InvalidRound(String),

    #[error("Invalid rollover: nothing pending on lead or pool")]
    InvalidRollover,

    #[error("Not enough reserved assets: have {have}, need {need}")]
    NotEnoughReservedAssets { have: u128, need: u128 },

    #[error("Share price is zero with {supply} shares outstanding")]
    ZeroSharePrice { supply: u128 },

    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(&'static str),

    #[error("Round advanced too soon: {elapsed_secs}s elapsed, minimum {min_secs}s")]
    RoundTooSoon { elapsed_secs: i64, min_secs: u64 },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // External dependency failures
    #[error("No oracle for asset {0}")]
    NoOracleForAsset(AssetId),

    #[error("Bad price for asset {0}")]
    BadPrice(AssetId),

    #[error("Price too old for asset {asset}: {age_secs}s old, max {max_age_secs}s")]
    TooOldPrice {
        asset: AssetId,
        age_secs: i64,
        max_age_secs: u64,
    },

    #[error("Valuation unavailable for account {0}")]
    ValuationUnavailable(AccountId),

    #[error("Adapter operation failed on {side} side (protocol {protocol}): {reason}")]
    AdapterOperationFailed {
        side: ExecutionSide,
        protocol: ProtocolId,
        reason: String,
    },

    // Timing gates
    #[error("Too early: {elapsed_secs}s since last round, emergency period is {period_secs}s")]
    TooEarly { elapsed_secs: i64, period_secs: u64 },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    /// Errors raised by an external collaborator rather than by local validation
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            VaultError::NoOracleForAsset(_)
                | VaultError::BadPrice(_)
                | VaultError::TooOldPrice { .. }
                | VaultError::ValuationUnavailable(_)
                | VaultError::AdapterOperationFailed { .. }
        )
    }
}

/// Result type alias for VaultError
pub type Result<T> = std::result::Result<T, VaultError>;
