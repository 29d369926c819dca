//! Consumer Pipeline
//!
//! Each [`Worker`] owns a broker connection whose ready hook
//! ([`JobConsumer`]) caps unacknowledged deliveries with a prefetch and starts
//! consuming into a [`JobProcessor`]. Per delivery the processor:
//!
//! 1. decodes the [`JobMessage`](crate::broker::JobMessage); malformed
//!    bodies are rejected without requeue
//! 2. computes the result ([`compute`])
//! 3. upserts a [`JobResult`] keyed by job id into the [`ResultSink`]
//! 4. increments the processed counter
//! 5. acks, or nacks with requeue if any of 2-4 failed
//!
//! Redelivery after a failure between steps 3 and 4 re-runs the upsert
//! harmlessly but increments `processed` again; delivery is at-least-once.

mod compute;
mod consumer;
mod document_store;
mod error;
mod processor;
mod sink;

pub use compute::{compute, JobResult};
pub use consumer::{JobConsumer, Worker};
pub use document_store::DocumentStoreSink;
pub use error::{SinkError, SinkResult, WorkerError, WorkerResult};
pub use processor::{Disposition, JobProcessor, StatsSnapshot};
pub use sink::{MemorySink, ResultSink, UpsertOutcome};

#[cfg(test)]
mod tests;
