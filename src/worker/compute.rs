//! Deterministic job computation

use crate::broker::JobMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Square the input, saturating at `u64::MAX`
pub fn compute(input: u64) -> u64 {
    input.saturating_mul(input)
}

/// Durable outcome of one job, keyed by `job_id` in the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: u64,
    pub run_id: String,
    pub input: u64,
    pub output: u64,
    pub processed_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
}

impl JobResult {
    pub fn from_message(message: &JobMessage) -> Self {
        let input = message.payload.value;
        Self {
            job_id: message.job_id,
            run_id: message.payload.run_id.clone(),
            input,
            output: compute(input),
            processed_at: Utc::now(),
            enqueued_at: message.enqueued_at,
        }
    }
}
