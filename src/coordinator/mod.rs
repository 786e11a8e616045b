//! Vault Coordinator
//!
//! Owns the lead ledger, the follower pool and the emergency state, and exposes every
//! vault operation. External collaborators (oracle, adapters, access policy, clock) are
//! injected as trait objects.

pub mod config;
pub mod coordinator;
pub mod state;

pub use config::{CoordinatorConfig, VaultAccounts};
pub use coordinator::VaultCoordinator;
pub use state::{InstructionOutcome, RoundSettlement, UnwindOutcome, VaultSnapshot, VaultState};
