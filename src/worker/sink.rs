//! Result sinks

use crate::core::sync::{handle_rwlock_read, handle_rwlock_write};
use crate::worker::{JobResult, SinkError, SinkResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Document store keyed by job id
///
/// `upsert` must be safe to repeat: writing the same job twice leaves one
/// document.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn upsert(&self, result: &JobResult) -> SinkResult<UpsertOutcome>;

    /// Number of stored documents
    async fn count(&self) -> SinkResult<u64>;

    /// Location description for logs
    fn describe(&self) -> String;
}

/// In-process sink
#[derive(Debug)]
pub struct MemorySink {
    documents: RwLock<HashMap<u64, JobResult>>,
    available: AtomicBool,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Make writes fail until switched back on
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn get(&self, job_id: u64) -> SinkResult<Option<JobResult>> {
        let documents = handle_rwlock_read(self.documents.read(), |message| {
            SinkError::Internal { message }
        })?;
        Ok(documents.get(&job_id).cloned())
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn upsert(&self, result: &JobResult) -> SinkResult<UpsertOutcome> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable {
                message: "in-memory sink is offline".to_string(),
            });
        }
        let mut documents = handle_rwlock_write(self.documents.write(), |message| {
            SinkError::Internal { message }
        })?;
        Ok(match documents.insert(result.job_id, result.clone()) {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        })
    }

    async fn count(&self) -> SinkResult<u64> {
        let documents = handle_rwlock_read(self.documents.read(), |message| {
            SinkError::Internal { message }
        })?;
        Ok(documents.len() as u64)
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}
