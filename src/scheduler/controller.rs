//! Periodic admission loop

use crate::broker::{ConnectionManager, JobMessage};
use crate::scheduler::{run_id, workload_value, RateAccumulator};
use crate::state::StateStore;
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::broadcast;

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No run is active; the accumulator was reset
    Idle,
    /// Less than one whole unit accumulated so far
    Accumulating,
    /// `requested` units were due, `published` of them reached the queue
    Admitted { requested: u64, published: u64 },
}

pub struct RateController {
    store: StateStore,
    producer: ConnectionManager,
    accumulator: RateAccumulator,
    tick_interval: Duration,
}

impl RateController {
    pub fn new(store: StateStore, producer: ConnectionManager, tick_interval: Duration) -> Self {
        Self {
            store,
            producer,
            accumulator: RateAccumulator::new(),
            tick_interval,
        }
    }

    pub fn accumulator(&self) -> &RateAccumulator {
        &self.accumulator
    }

    /// Run one admission step
    ///
    /// Admission stops at the first job the broker does not accept; the
    /// remaining units of this tick are dropped and the rate catches up on
    /// later ticks.
    pub async fn tick(&mut self) -> TickOutcome {
        let state = self.store.get_state().await;
        if !state.running {
            self.accumulator.reset();
            return TickOutcome::Idle;
        }

        let requested =
            self.accumulator
                .advance(state.target_units, state.window_minutes, self.tick_interval);
        if requested == 0 {
            debug!(
                "Accumulating admission ({:.3}) at {:.2} jobs/min",
                self.accumulator.carried(),
                state.rate_per_minute().unwrap_or(0.0)
            );
            return TickOutcome::Accumulating;
        }

        debug!(
            "Admitting {} job(s) at {:.2} jobs/min",
            requested,
            state.rate_per_minute().unwrap_or(0.0)
        );
        let run_id = run_id(&state);
        let mut published = 0;
        for _ in 0..requested {
            let job_id = match self.store.next_job_id().await {
                Ok(job_id) => job_id,
                Err(e) => {
                    warn!("No job id available, admission paused until next tick: {}", e);
                    break;
                }
            };

            let message = JobMessage::new(job_id, run_id.clone(), workload_value(&run_id, job_id));
            if !self.producer.publish(&message).await {
                warn!("Job {} not admitted, will retry next tick", job_id);
                break;
            }
            published += 1;

            if let Err(e) = self.store.increment_enqueued().await {
                error!("Job {} admitted but not counted as enqueued: {}", job_id, e);
                break;
            }
        }

        TickOutcome::Admitted {
            requested,
            published,
        }
    }

    /// Tick at the fixed interval until shutdown is signalled
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Rate controller started (tick every {:?})", self.tick_interval);
        let mut ticker = tokio::time::interval(self.tick_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Rate controller stopping");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}
