mod paper;
mod registry;
mod traits;

pub use paper::PaperAdapter;
pub use registry::{resolve_adapter, AdapterEntry, AdapterRegistry, StaticAdapterRegistry};
pub use traits::AdapterGateway;
