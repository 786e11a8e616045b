//! Lead → pool trade replication

mod relay;

pub use relay::{compute_ratio, ensure_funded, execute_on, ExecutionOutcome};
