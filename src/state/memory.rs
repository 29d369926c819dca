//! In-process state backend
//!
//! Shared between all components of one process through an `Arc`. The
//! availability switch lets callers simulate a store outage.

use crate::core::sync::{handle_mutex_poison, handle_rwlock_read, handle_rwlock_write};
use crate::state::{Counter, StateBackend, StateError, StateResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use tokio::sync::broadcast;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct MemoryStateBackend {
    /// Serialized run configuration
    config: RwLock<Option<String>>,

    enqueued: AtomicU64,
    processed: AtomicU64,
    next_job_id: AtomicU64,

    /// Pub/sub channels by name, created on first use
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,

    /// Buffer per subscriber before it starts lagging
    channel_capacity: usize,

    /// When false every operation fails with `Unavailable`
    available: AtomicBool,
}

impl Default for MemoryStateBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStateBackend {
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_channel_capacity(channel_capacity: usize) -> Self {
        Self {
            config: RwLock::new(None),
            enqueued: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            next_job_id: AtomicU64::new(0),
            channels: Mutex::new(HashMap::new()),
            channel_capacity: channel_capacity.max(1),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> StateResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StateError::Unavailable {
                message: "in-memory store is offline".to_string(),
            })
        }
    }

    fn cell(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Enqueued => &self.enqueued,
            Counter::Processed => &self.processed,
            Counter::NextJobId => &self.next_job_id,
        }
    }
}

#[async_trait]
impl StateBackend for MemoryStateBackend {
    async fn load_config(&self) -> StateResult<Option<String>> {
        self.ensure_available()?;
        let config = handle_rwlock_read(self.config.read(), |message| StateError::Internal {
            message,
        })?;
        Ok(config.clone())
    }

    async fn store_config(&self, blob: String) -> StateResult<()> {
        self.ensure_available()?;
        let mut config = handle_rwlock_write(self.config.write(), |message| StateError::Internal {
            message,
        })?;
        *config = Some(blob);
        Ok(())
    }

    async fn delete_config(&self) -> StateResult<()> {
        self.ensure_available()?;
        let mut config = handle_rwlock_write(self.config.write(), |message| StateError::Internal {
            message,
        })?;
        *config = None;
        Ok(())
    }

    async fn read_counter(&self, counter: Counter) -> StateResult<u64> {
        self.ensure_available()?;
        Ok(self.cell(counter).load(Ordering::SeqCst))
    }

    async fn write_counter(&self, counter: Counter, value: u64) -> StateResult<()> {
        self.ensure_available()?;
        self.cell(counter).store(value, Ordering::SeqCst);
        Ok(())
    }

    async fn increment_counter(&self, counter: Counter) -> StateResult<u64> {
        self.ensure_available()?;
        Ok(self.cell(counter).fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn publish(&self, channel: &str, payload: String) -> StateResult<usize> {
        self.ensure_available()?;
        let channels = handle_mutex_poison(self.channels.lock(), |message| StateError::Internal {
            message,
        })?;
        match channels.get(channel) {
            // A send error only means nobody is listening
            Some(sender) => Ok(sender.send(payload).unwrap_or(0)),
            None => Ok(0),
        }
    }

    async fn subscribe(&self, channel: &str) -> StateResult<broadcast::Receiver<String>> {
        self.ensure_available()?;
        let mut channels =
            handle_mutex_poison(self.channels.lock(), |message| StateError::Internal {
                message,
            })?;
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0);
        Ok(sender.subscribe())
    }

    async fn ping(&self) -> StateResult<()> {
        self.ensure_available()
    }
}
