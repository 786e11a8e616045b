//! Follower pool share accounting

mod accounting;
mod participant;

pub use accounting::{ClaimAmounts, PoolAccounting, PoolLedger, SettlementInputs, SettlementOutcome};
pub use participant::ParticipantRecord;
