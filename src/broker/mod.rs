//! Broker Connection Manager
//!
//! Connects a role (producer or consumer) to the message broker and keeps
//! that connection alive:
//!
//! - [`ConnectionManager`] runs the `Disconnected → Connecting → Ready` state
//!   machine with a fixed reconnect delay and at most one pending timer
//! - on every connection it opens a channel, declares the durable queue and
//!   calls the role's [`ChannelReadyHook`]
//! - [`ConnectionManager::publish`] sends persistent [`JobMessage`]s and
//!   reports a full buffer as `false`, not as an error
//! - consumers receive [`Delivery`] values and must `ack` or `nack` each one
//!
//! The transport is a trait seam ([`BrokerTransport`], [`BrokerConnection`],
//! [`BrokerChannel`]); [`MemoryBroker`] is the in-process implementation.

mod channel;
mod connection;
mod error;
mod memory;
mod message;
mod transport;

pub use channel::{ChannelReadyHook, Delivery, DeliveryHandler, NoopHook, ReadyChannel};
pub use connection::{BrokerSettings, ConnectionManager, ConnectionState};
pub use error::{BrokerError, BrokerResult};
pub use memory::MemoryBroker;
pub use message::{JobMessage, JobPayload};
pub use transport::{BrokerChannel, BrokerConnection, BrokerTransport, ConnectionEvent, RawDelivery};

#[cfg(test)]
mod tests;
