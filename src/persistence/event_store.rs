//! Event Store
//!
//! Append-only audit log. One event per successful operation; rejected operations leave
//! no trace. Events are never updated or removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{AccountId, AssetId, ExecutionSide, ProtocolId};

/// Metadata for stored events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Shared by events produced by one operation (e.g. both sides of a relay)
    pub correlation_id: Option<Uuid>,
    /// Account that invoked the operation
    pub triggered_by: Option<AccountId>,
}

impl EventMetadata {
    pub fn with_correlation(correlation_id: Uuid) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            ..Default::default()
        }
    }

    pub fn with_triggered_by(mut self, account: &AccountId) -> Self {
        self.triggered_by = Some(account.clone());
        self
    }

    pub fn triggered_by(account: &AccountId) -> Self {
        Self::default().with_triggered_by(account)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultEvent {
    DepositRecorded {
        participant: AccountId,
        amount: u128,
    },
    WithdrawRequested {
        participant: AccountId,
        shares: u128,
    },
    ClaimSettled {
        participant: AccountId,
        shares: u128,
        assets: u128,
    },
    RoundSettled {
        settlement_id: Uuid,
        round: u64,
        price_per_share: u128,
        shares_minted: u128,
        shares_burned: u128,
        profit_value: i128,
        deposits_processed: u128,
        fee_assets: u128,
    },
    EmergencyUnwindAttempted {
        attempt: u32,
        slippage_bps: u32,
        remaining: usize,
    },
    EmergencyUnwindCompleted {
        attempts: u32,
        closed: usize,
    },
    LeadDepositRecorded {
        amount: u128,
    },
    LeadWithdrawRequested {
        amount: u128,
    },
    InstructionExecuted {
        side: ExecutionSide,
        protocol: ProtocolId,
        market: String,
        ratio: u128,
    },
    ReplicationSkipped {
        protocol: ProtocolId,
        reason: String,
    },
    ReplicationFailed {
        protocol: ProtocolId,
        reason: String,
    },
    FeesCollected {
        admin: AccountId,
        assets: u128,
    },
    EmergencyWithdrawal {
        admin: AccountId,
        asset: AssetId,
        amount: u128,
    },
    ExternalTransfer {
        account: AccountId,
        asset: AssetId,
        amount: i128,
    },
}

impl VaultEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            VaultEvent::DepositRecorded { .. } => "deposit_recorded",
            VaultEvent::WithdrawRequested { .. } => "withdraw_requested",
            VaultEvent::ClaimSettled { .. } => "claim_settled",
            VaultEvent::RoundSettled { .. } => "round_settled",
            VaultEvent::EmergencyUnwindAttempted { .. } => "emergency_unwind_attempted",
            VaultEvent::EmergencyUnwindCompleted { .. } => "emergency_unwind_completed",
            VaultEvent::LeadDepositRecorded { .. } => "lead_deposit_recorded",
            VaultEvent::LeadWithdrawRequested { .. } => "lead_withdraw_requested",
            VaultEvent::InstructionExecuted { .. } => "instruction_executed",
            VaultEvent::ReplicationSkipped { .. } => "replication_skipped",
            VaultEvent::ReplicationFailed { .. } => "replication_failed",
            VaultEvent::FeesCollected { .. } => "fees_collected",
            VaultEvent::EmergencyWithdrawal { .. } => "emergency_withdrawal",
            VaultEvent::ExternalTransfer { .. } => "external_transfer",
        }
    }
}

/// A stored event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub seq: u64,
    /// Round that was current when the event was appended
    pub round: u64,
    pub event: VaultEvent,
    #[serde(default)]
    pub metadata: EventMetadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStore {
    events: Vec<StoredEvent>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Returns its sequence number.
    pub fn append(
        &mut self,
        round: u64,
        event: VaultEvent,
        metadata: EventMetadata,
        created_at: DateTime<Utc>,
    ) -> u64 {
        let seq = self.events.len() as u64 + 1;
        debug!("Appended event {} ({}) in round {}", seq, event.event_type(), round);
        self.events.push(StoredEvent {
            seq,
            round,
            event,
            metadata,
            created_at,
        });
        seq
    }

    pub fn events(&self) -> &[StoredEvent] {
        &self.events
    }

    /// Events after sequence number `since`
    pub fn events_since(&self, since: u64) -> &[StoredEvent] {
        let start = (since as usize).min(self.events.len());
        &self.events[start..]
    }

    pub fn events_by_type<'a>(&'a self, event_type: &'a str) -> impl Iterator<Item = &'a StoredEvent> {
        self.events
            .iter()
            .filter(move |e| e.event.event_type() == event_type)
    }

    pub fn last(&self) -> Option<&StoredEvent> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_sequence() {
        let mut store = EventStore::new();
        let alice = AccountId::new("alice");
        let now = Utc::now();

        let first = store.append(
            0,
            VaultEvent::DepositRecorded {
                participant: alice.clone(),
                amount: 10,
            },
            EventMetadata::triggered_by(&alice),
            now,
        );
        let second = store.append(
            0,
            VaultEvent::LeadDepositRecorded { amount: 5 },
            EventMetadata::default(),
            now,
        );

        assert_eq!((first, second), (1, 2));
        assert_eq!(store.events_since(1).len(), 1);
        assert_eq!(store.events_since(9).len(), 0);
        assert_eq!(store.events_by_type("deposit_recorded").count(), 1);
        assert_eq!(
            store.events()[0].metadata.triggered_by.as_ref(),
            Some(&alice)
        );
    }
}
