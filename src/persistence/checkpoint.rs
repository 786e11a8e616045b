//! Checkpoints
//!
//! JSON snapshots of engine state for crash recovery and offline inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, VaultError};

/// Trait for types that can be checkpointed
pub trait Checkpointable: Send + Sync {
    /// Checkpoint type identifier
    fn checkpoint_type(&self) -> &str;

    /// Serialize current state
    fn to_checkpoint(&self) -> Result<String>;

    /// Replace current state with a checkpoint
    fn from_checkpoint(&mut self, data: &str) -> Result<()>;

    /// Monotonic version of the state
    fn version(&self) -> u64;
}

/// Checkpoint data structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_type: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    /// Serialized state. Kept as text so 128-bit integers survive untouched.
    pub data: String,
}

impl Checkpoint {
    pub fn capture<T: Checkpointable>(component: &T, created_at: DateTime<Utc>) -> Result<Self> {
        let checkpoint = Self {
            checkpoint_type: component.checkpoint_type().to_string(),
            version: component.version(),
            created_at,
            data: component.to_checkpoint()?,
        };
        debug!(
            "Captured {} checkpoint (version {}, {} bytes)",
            checkpoint.checkpoint_type,
            checkpoint.version,
            checkpoint.data.len()
        );
        Ok(checkpoint)
    }

    pub fn restore_into<T: Checkpointable>(&self, component: &mut T) -> Result<()> {
        if self.checkpoint_type != component.checkpoint_type() {
            return Err(VaultError::InvalidState(format!(
                "Checkpoint restore failed: expected {}, got {}",
                component.checkpoint_type(),
                self.checkpoint_type
            )));
        }
        component.from_checkpoint(&self.data)?;
        info!(
            "Restored {} checkpoint (version {})",
            self.checkpoint_type, self.version
        );
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        info!("Wrote checkpoint version {} to {}", self.version, path.display());
        Ok(())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
