//! Per-delivery job processing

use crate::broker::{Delivery, DeliveryHandler, JobMessage};
use crate::state::StateStore;
use crate::worker::{JobResult, ResultSink, WorkerError, WorkerResult};
use async_trait::async_trait;
use log::{debug, error, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How a delivery is settled after processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Disposition {
    Ack,
    /// Nack with requeue: immediate redelivery
    Requeue,
    /// Nack without requeue: the message is dead-lettered
    Reject,
}

impl Disposition {
    pub fn for_result<T>(result: &WorkerResult<T>) -> Self {
        match result {
            Ok(_) => Disposition::Ack,
            Err(WorkerError::Malformed { .. }) => Disposition::Reject,
            Err(_) => Disposition::Requeue,
        }
    }
}

#[derive(Debug, Default)]
struct ProcessorStats {
    acked: AtomicU64,
    requeued: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub acked: u64,
    pub requeued: u64,
    pub rejected: u64,
}

impl std::ops::Add for StatsSnapshot {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            acked: self.acked + other.acked,
            requeued: self.requeued + other.requeued,
            rejected: self.rejected + other.rejected,
        }
    }
}

pub struct JobProcessor {
    label: String,
    store: StateStore,
    sink: Arc<dyn ResultSink>,
    stats: ProcessorStats,
}

impl JobProcessor {
    pub fn new(label: impl Into<String>, store: StateStore, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            label: label.into(),
            store,
            sink,
            stats: ProcessorStats::default(),
        }
    }

    /// Decode, compute, upsert and count one job
    ///
    /// Succeeds only once the result is stored and the processed counter
    /// has moved; the caller acks only then.
    pub async fn process(&self, body: &[u8]) -> WorkerResult<JobResult> {
        let message = JobMessage::from_bytes(body)?;
        let result = JobResult::from_message(&message);
        debug!(
            "[{}] Job {} computed: {} -> {}",
            self.label, result.job_id, result.input, result.output
        );

        let outcome = self.sink.upsert(&result).await?;
        debug!("[{}] Job {} {} in sink", self.label, result.job_id, outcome);

        let processed = self.store.increment_processed().await?;
        debug!(
            "[{}] Job {} done (total processed: {})",
            self.label, result.job_id, processed
        );
        Ok(result)
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            acked: self.stats.acked.load(Ordering::Relaxed),
            requeued: self.stats.requeued.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
        }
    }

    async fn settle(&self, delivery: &Delivery, disposition: Disposition) {
        let settled = match disposition {
            Disposition::Ack => delivery.ack().await,
            Disposition::Requeue => delivery.nack(true).await,
            Disposition::Reject => delivery.nack(false).await,
        };
        match settled {
            Ok(()) => {
                let counter = match disposition {
                    Disposition::Ack => &self.stats.acked,
                    Disposition::Requeue => &self.stats.requeued,
                    Disposition::Reject => &self.stats.rejected,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!(
                "[{}] Delivery {} could not be settled ({}), broker will redeliver: {}",
                self.label, delivery.tag, disposition, e
            ),
        }
    }
}

#[async_trait]
impl DeliveryHandler for JobProcessor {
    async fn handle(&self, delivery: Delivery) {
        let result = self.process(&delivery.body).await;
        let disposition = Disposition::for_result(&result);
        match &result {
            Ok(job) => debug!("[{}] Job {} acknowledged", self.label, job.job_id),
            Err(e @ WorkerError::Malformed { .. }) => {
                error!("[{}] Rejecting delivery {}: {}", self.label, delivery.tag, e)
            }
            Err(e) => error!(
                "[{}] Job processing failed, requeueing delivery {}: {}",
                self.label, delivery.tag, e
            ),
        }
        self.settle(&delivery, disposition).await;
    }
}
