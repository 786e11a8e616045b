//! Coordinator State: everything the vault owns, in one value

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{EmergencyPhase, ExecutionReport, ExecutionSide};
use crate::emergency::EmergencyState;
use crate::error::Result;
use crate::ledger::{AssetBook, LeadLedger};
use crate::persistence::{Checkpointable, EventMetadata, EventStore, VaultEvent};
use crate::pool::{PoolAccounting, SettlementOutcome};
use crate::replication::ExecutionOutcome;

/// Lead ledger, pool accounting, emergency state, balances and the event log.
///
/// Mutations happen on a staged clone that replaces the live value only once the whole
/// operation has succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    pub lead: LeadLedger,
    pub pool: PoolAccounting,
    pub emergency: EmergencyState,
    pub book: AssetBook,
    pub events: EventStore,
}

impl VaultState {
    pub fn new(default_slippage_bps: u32, started_at: i64) -> Self {
        Self {
            lead: LeadLedger::new(),
            pool: PoolAccounting::new(),
            emergency: EmergencyState::new(default_slippage_bps, started_at),
            book: AssetBook::new(),
            events: EventStore::new(),
        }
    }

    pub fn current_round(&self) -> u64 {
        self.pool.ledger.current_round()
    }

    pub fn emit(&mut self, event: VaultEvent, metadata: EventMetadata, at: DateTime<Utc>) -> u64 {
        let round = self.current_round();
        self.events.append(round, event, metadata, at)
    }
}

impl Checkpointable for VaultState {
    fn checkpoint_type(&self) -> &str {
        "vault_state"
    }

    fn to_checkpoint(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn from_checkpoint(&mut self, data: &str) -> Result<()> {
        *self = serde_json::from_str(data)?;
        Ok(())
    }

    fn version(&self) -> u64 {
        self.events.len() as u64
    }
}

/// Result of `advance_round`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSettlement {
    pub settlement_id: Uuid,
    pub pool: SettlementOutcome,
    pub lead_round: u64,
    pub lead_withdrawn: u128,
    pub lead_after_round_balance: u128,
    pub settled_at: DateTime<Utc>,
}

/// Result of `issue_instruction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionOutcome {
    pub lead: ExecutionOutcome,
    /// Present when the pool side executed
    pub pool: Option<ExecutionOutcome>,
    /// Why replication did not run, when it was requested but skipped
    pub skipped: Option<String>,
}

impl InstructionOutcome {
    pub fn report(&self, side: ExecutionSide) -> Option<&ExecutionReport> {
        match side {
            ExecutionSide::Lead => Some(&self.lead.report),
            ExecutionSide::Pool => self.pool.as_ref().map(|p| &p.report),
        }
    }
}

/// Result of `emergency_unwind`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnwindOutcome {
    pub phase: EmergencyPhase,
    pub is_emergency_open: bool,
    pub slippage_bps: u32,
    pub attempted: usize,
    pub closed: usize,
    pub remaining: usize,
}

/// Read-only summary of the vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub round: u64,
    pub lead_round: u64,
    pub total_share_supply: u128,
    pub custody_shares: u128,
    pub pending_deposit_assets: u128,
    pub pending_withdraw_shares: u128,
    pub processed_withdraw_assets: u128,
    pub accrued_performance_fee_assets: u128,
    pub latest_price_per_share: Option<u128>,
    pub pool_underlying: u128,
    pub lead_underlying: u128,
    pub emergency_phase: EmergencyPhase,
    pub is_emergency_open: bool,
    pub current_slippage_bps: u32,
    pub event_count: usize,
}
