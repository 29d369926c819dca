//! Storage primitives the state store is built on

use crate::state::{Counter, StateResult};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Key/counter/channel primitives of a shared state backend
///
/// Implementations must make `increment_counter` atomic with respect to every
/// other caller of the same backend, including callers in other processes
/// when the backend is shared.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Read the serialized run configuration, `None` when no run was ever stored
    async fn load_config(&self) -> StateResult<Option<String>>;

    async fn store_config(&self, blob: String) -> StateResult<()>;

    async fn delete_config(&self) -> StateResult<()>;

    async fn read_counter(&self, counter: Counter) -> StateResult<u64>;

    async fn write_counter(&self, counter: Counter, value: u64) -> StateResult<()>;

    /// Atomically increment and return the new value
    async fn increment_counter(&self, counter: Counter) -> StateResult<u64>;

    /// Broadcast a payload, returning how many subscribers received it
    async fn publish(&self, channel: &str, payload: String) -> StateResult<usize>;

    async fn subscribe(&self, channel: &str) -> StateResult<broadcast::Receiver<String>>;

    async fn ping(&self) -> StateResult<()>;
}
