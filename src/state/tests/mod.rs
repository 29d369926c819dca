//! Test suites for the shared state store


use crate::state::{MemoryStateBackend, StateStore, StoreSettings};
use std::sync::Arc;

/// Store over a fresh in-memory backend, with the backend handle for outage tests
pub(crate) fn memory_store() -> (StateStore, Arc<MemoryStateBackend>) {
    let backend = Arc::new(MemoryStateBackend::new());
    let store = StateStore::new(backend.clone(), StoreSettings::default());
    (store, backend)
}
