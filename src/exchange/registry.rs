use std::collections::BTreeMap;
use std::sync::Arc;

use super::AdapterGateway;
use crate::domain::ProtocolId;
use crate::error::{Result, VaultError};

/// What a protocol id resolves to
#[derive(Clone)]
pub enum AdapterEntry {
    Capability(Arc<dyn AdapterGateway>),
    /// Registered, but carries no execution capability
    Disabled,
}

/// Protocol id → adapter lookup
pub trait AdapterRegistry: Send + Sync {
    fn adapter_for(&self, protocol: ProtocolId) -> Option<AdapterEntry>;

    /// Every enabled adapter
    fn capabilities(&self) -> Vec<(ProtocolId, Arc<dyn AdapterGateway>)>;
}

/// Resolve `protocol` to an executable adapter
pub fn resolve_adapter(
    registry: &dyn AdapterRegistry,
    protocol: ProtocolId,
) -> Result<Arc<dyn AdapterGateway>> {
    match registry.adapter_for(protocol) {
        None => Err(VaultError::InvalidProtocol(protocol)),
        Some(AdapterEntry::Disabled) => Err(VaultError::InvalidAdapter(protocol)),
        Some(AdapterEntry::Capability(adapter)) => Ok(adapter),
    }
}

#[derive(Clone, Default)]
pub struct StaticAdapterRegistry {
    entries: BTreeMap<ProtocolId, AdapterEntry>,
}

impl StaticAdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, protocol: ProtocolId, adapter: Arc<dyn AdapterGateway>) -> Self {
        self.entries
            .insert(protocol, AdapterEntry::Capability(adapter));
        self
    }

    pub fn register_disabled(mut self, protocol: ProtocolId) -> Self {
        self.entries.insert(protocol, AdapterEntry::Disabled);
        self
    }
}

impl AdapterRegistry for StaticAdapterRegistry {
    fn adapter_for(&self, protocol: ProtocolId) -> Option<AdapterEntry> {
        self.entries.get(&protocol).cloned()
    }

    fn capabilities(&self) -> Vec<(ProtocolId, Arc<dyn AdapterGateway>)> {
        self.entries
            .iter()
            .filter_map(|(id, entry)| match entry {
                AdapterEntry::Capability(adapter) => Some((*id, adapter.clone())),
                AdapterEntry::Disabled => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperAdapter;

    #[test]
    fn test_resolution_distinguishes_unknown_and_disabled() {
        let registry = StaticAdapterRegistry::new()
            .register(1, Arc::new(PaperAdapter::new("paper")))
            .register_disabled(2);

        assert!(resolve_adapter(&registry, 1).is_ok());
        assert!(matches!(
            resolve_adapter(&registry, 2),
            Err(VaultError::InvalidAdapter(2))
        ));
        assert!(matches!(
            resolve_adapter(&registry, 9),
            Err(VaultError::InvalidProtocol(9))
        ));
        assert_eq!(registry.capabilities().len(), 1);
    }
}
