pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod emergency;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod persistence;
pub mod pool;
pub mod replication;
pub mod safety;
pub mod simulation;
pub mod valuation;

pub use config::AppConfig;
pub use coordinator::{
    CoordinatorConfig, InstructionOutcome, RoundSettlement, UnwindOutcome, VaultAccounts,
    VaultCoordinator, VaultSnapshot, VaultState,
};
pub use domain::{AccountId, AssetId, Clock, ManualClock, SystemClock, TradeInstruction, PRECISION};
pub use error::{Result, VaultError};
pub use exchange::{AdapterGateway, AdapterRegistry, PaperAdapter, StaticAdapterRegistry};
pub use persistence::{Checkpoint, Checkpointable, EventMetadata, EventStore, StoredEvent, VaultEvent};
pub use safety::{AccessPolicy, StaticAllowList};
pub use valuation::{StaticOracle, ValuationOracle};
