//! Synthetic workload for admitted jobs

use crate::state::RunState;
use sha2::{Digest, Sha256};

const VALUE_RANGE: u64 = 1_000_000;

/// Identifier of a run, taken from its start timestamp
pub fn run_id(state: &RunState) -> String {
    state
        .started_at
        .map(|started| started.to_rfc3339())
        .unwrap_or_else(|| "unscheduled".to_string())
}

/// Deterministic job input in `0..1_000_000`, derived from run and job id
pub fn workload_value(run_id: &str, job_id: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(run_id.as_bytes());
    hasher.update(b":");
    hasher.update(job_id.to_be_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % VALUE_RANGE
}
