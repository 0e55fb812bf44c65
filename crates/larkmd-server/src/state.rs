//! Application state for the API server.

use std::sync::Arc;

use larkmd_core::{DomainRegistry, FixedPermissions, MemoryStorage};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Domain registry all handlers go through.
    pub registry: Arc<DomainRegistry>,
}

impl AppState {
    /// Creates application state over an existing registry.
    pub fn new(registry: Arc<DomainRegistry>) -> Self {
        Self { registry }
    }

    /// Creates application state with in-memory storage that grants every
    /// permission request.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(DomainRegistry::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(FixedPermissions::granting()),
        )))
    }
}
