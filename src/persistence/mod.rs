//! Persistence Layer
//!
//! - Event store: append-only audit trail of every committed operation
//! - Checkpoints: full-state snapshots for recovery

pub mod checkpoint;
pub mod event_store;

pub use checkpoint::{Checkpoint, Checkpointable};
pub use event_store::{EventMetadata, EventStore, StoredEvent, VaultEvent};
