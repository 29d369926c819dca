//! Shared state store handle

use crate::state::{Counter, RunConfig, RunState, RunStatePatch, StateBackend, StateResult};
use log::{debug, error, info, warn};
use std::sync::Arc;
use strum::IntoEnumIterator;
use tokio::sync::broadcast;

/// Channel name and publish throttling for a [`StateStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub progress_channel: String,

    /// Publish a snapshot when the enqueued counter hits a multiple of this (0 disables)
    pub enqueue_publish_every: u64,

    /// Publish a snapshot when the processed counter hits a multiple of this (0 disables)
    pub processed_publish_every: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            progress_channel: "jobpacer:progress".to_string(),
            enqueue_publish_every: 10,
            processed_publish_every: 1,
        }
    }
}

/// Cloneable handle over a shared [`StateBackend`]
///
/// Reads through [`StateStore::get_state`] never fail: an unreachable or
/// empty store yields the inactive default state, so a controller tick
/// against a dead store simply admits nothing.
#[derive(Clone)]
pub struct StateStore {
    backend: Arc<dyn StateBackend>,
    settings: StoreSettings,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl StateStore {
    pub fn new(backend: Arc<dyn StateBackend>, settings: StoreSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Current run state, falling back to the default on absence or failure
    pub async fn get_state(&self) -> RunState {
        match self.try_get_state().await {
            Ok(Some(state)) => state,
            Ok(None) => RunState::default(),
            Err(e) => {
                warn!("Run state unreadable, using defaults: {}", e);
                RunState::default()
            }
        }
    }

    /// Current run state; `Ok(None)` when no run was ever stored
    pub async fn try_get_state(&self) -> StateResult<Option<RunState>> {
        let Some(blob) = self.backend.load_config().await? else {
            return Ok(None);
        };
        let config: RunConfig = serde_json::from_str(&blob)?;
        let enqueued = self.backend.read_counter(Counter::Enqueued).await?;
        let processed = self.backend.read_counter(Counter::Processed).await?;
        Ok(Some(RunState::from_parts(config, enqueued, processed)))
    }

    /// Overwrite the configuration and both progress counters
    pub async fn set_state(&self, state: &RunState) -> StateResult<()> {
        let blob = serde_json::to_string(&state.config())?;
        self.backend.store_config(blob).await?;
        self.backend
            .write_counter(Counter::Enqueued, state.enqueued)
            .await?;
        self.backend
            .write_counter(Counter::Processed, state.processed)
            .await?;
        info!(
            "Run state set: running={} target={} window={}m",
            state.running, state.target_units, state.window_minutes
        );
        Ok(())
    }

    /// Merge a partial update into the stored configuration; counters are untouched
    pub async fn patch_state(&self, patch: &RunStatePatch) -> StateResult<RunState> {
        let mut config = match self.backend.load_config().await? {
            Some(blob) => serde_json::from_str(&blob)?,
            None => RunConfig::default(),
        };
        patch.apply_to(&mut config);
        self.backend
            .store_config(serde_json::to_string(&config)?)
            .await?;
        debug!("Run state patched: {:?}", patch);

        let enqueued = self.backend.read_counter(Counter::Enqueued).await?;
        let processed = self.backend.read_counter(Counter::Processed).await?;
        Ok(RunState::from_parts(config, enqueued, processed))
    }

    /// Atomically bump the enqueued counter, publishing progress every Nth value
    pub async fn increment_enqueued(&self) -> StateResult<u64> {
        let value = self.increment(Counter::Enqueued).await?;
        if should_publish(value, self.settings.enqueue_publish_every) {
            self.publish_progress().await;
        }
        Ok(value)
    }

    /// Atomically bump the processed counter, publishing progress every Nth value
    pub async fn increment_processed(&self) -> StateResult<u64> {
        let value = self.increment(Counter::Processed).await?;
        if should_publish(value, self.settings.processed_publish_every) {
            self.publish_progress().await;
        }
        Ok(value)
    }

    /// Next job identifier from the dedicated id counter
    pub async fn next_job_id(&self) -> StateResult<u64> {
        self.increment(Counter::NextJobId).await
    }

    /// Broadcast a snapshot with freshly read counters
    ///
    /// Failures are logged and swallowed; progress is advisory.
    pub async fn publish_progress(&self) {
        let state = self.get_state().await;
        let payload = match serde_json::to_string(&state) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode progress snapshot: {}", e);
                return;
            }
        };
        match self
            .backend
            .publish(&self.settings.progress_channel, payload)
            .await
        {
            Ok(receivers) => debug!(
                "Progress published to {} subscriber(s): enqueued={} processed={}",
                receivers, state.enqueued, state.processed
            ),
            Err(e) => warn!("Failed to publish progress: {}", e),
        }
    }

    pub async fn subscribe_progress(&self) -> StateResult<broadcast::Receiver<String>> {
        self.backend
            .subscribe(&self.settings.progress_channel)
            .await
    }

    pub async fn is_connected(&self) -> bool {
        self.backend.ping().await.is_ok()
    }

    /// Remove the run and zero every counter, including the job id counter
    pub async fn reset(&self) -> StateResult<()> {
        self.backend.delete_config().await?;
        for counter in Counter::iter() {
            self.backend.write_counter(counter, 0).await?;
        }
        info!("Run state reset");
        Ok(())
    }

    async fn increment(&self, counter: Counter) -> StateResult<u64> {
        self.backend
            .increment_counter(counter)
            .await
            .inspect_err(|e| error!("Failed to increment {} counter: {}", counter, e))
    }
}

fn should_publish(value: u64, every: u64) -> bool {
    every > 0 && value % every == 0
}
