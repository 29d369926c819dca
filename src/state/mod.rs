//! Shared State Store
//!
//! Holds the run configuration and the progress counters that every
//! controller and worker instance shares, and broadcasts progress snapshots.
//!
//! # Storage layout
//!
//! ```text
//! ┌───────────────────────────── StateBackend ─────────────────────────────┐
//! │  config blob (JSON)   {running, targetUnits, windowMinutes, startedAt} │
//! │  counter  enqueued    ── atomic increment                              │
//! │  counter  processed   ── atomic increment                              │
//! │  counter  next_job_id ── atomic increment                              │
//! │  channel  progress    ── broadcast of full RunState snapshots          │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Counters live in their own cells rather than inside the config blob, so an
//! increment is a single atomic operation and never a read-modify-write of
//! the configuration. [`StateStore`] is the handle components receive; it
//! adds the fallback-to-default read path and throttled progress publishing
//! on top of a [`StateBackend`].

mod backend;
mod error;
mod memory;
mod store;
mod types;

pub use backend::StateBackend;
pub use error::{StateError, StateResult};
pub use memory::MemoryStateBackend;
pub use store::{StateStore, StoreSettings};
pub use types::{Counter, RunConfig, RunState, RunStatePatch};

#[cfg(test)]
mod tests;
