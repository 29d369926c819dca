//! Transport seams between the connection manager and a concrete broker

use crate::broker::BrokerResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Asynchronous notifications raised by an open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection is gone and must be re-established
    Closed { reason: String },
    /// A non-fatal error; the connection stays usable
    Error { message: String },
}

/// A message handed to a consumer, before it is wrapped into a `Delivery`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDelivery {
    pub tag: u64,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

/// Opens connections to one broker endpoint
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn connect(&self) -> BrokerResult<Arc<dyn BrokerConnection>>;

    /// Endpoint description for logs
    fn endpoint(&self) -> String;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync {
    fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent>;

    async fn create_channel(&self) -> BrokerResult<Arc<dyn BrokerChannel>>;

    async fn close(&self) -> BrokerResult<()>;
}

/// A channel on an open connection
///
/// Deliveries are only ever acknowledged through the channel that received them.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn declare_queue(&self, queue: &str, durable: bool) -> BrokerResult<()>;

    /// Send a message; `Ok(false)` means the outbound buffer is full, retry later
    async fn publish(&self, queue: &str, body: Vec<u8>, persistent: bool) -> BrokerResult<bool>;

    /// Cap unacknowledged deliveries for consumers started after this call (0 = unlimited)
    async fn set_prefetch(&self, count: u16) -> BrokerResult<()>;

    /// Start consuming with manual acknowledgement
    async fn consume(&self, queue: &str) -> BrokerResult<mpsc::UnboundedReceiver<RawDelivery>>;

    async fn ack(&self, tag: u64) -> BrokerResult<()>;

    async fn nack(&self, tag: u64, requeue: bool) -> BrokerResult<()>;

    async fn close(&self) -> BrokerResult<()>;
}
