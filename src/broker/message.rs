//! Job message wire format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of admitted work, JSON-encoded on the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub job_id: u64,
    pub payload: JobPayload,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    /// Identifies the run that admitted the job (its start timestamp)
    pub run_id: String,
    pub value: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl JobMessage {
    pub fn new(job_id: u64, run_id: impl Into<String>, value: u64) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            payload: JobPayload {
                run_id: run_id.into(),
                value,
                enqueued_at: now,
            },
            enqueued_at: now,
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
