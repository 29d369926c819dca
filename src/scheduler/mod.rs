//! Rate Controller
//!
//! Admits jobs onto the queue at `targetUnits / windowMinutes` per minute.
//! Each tick adds the per-tick rate to a fractional accumulator and admits
//! its whole part, so rates below one job per tick still converge to the
//! configured rate with at most one unit of drift.

mod accumulator;
mod controller;
mod workload;

pub use accumulator::{units_per_second, RateAccumulator};
pub use controller::{RateController, TickOutcome};
pub use workload::{run_id, workload_value};
