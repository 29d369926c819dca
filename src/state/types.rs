//! Run state data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full view of the active run: configuration plus live counters
///
/// This is also the wire format of progress snapshots (camelCase JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub running: bool,
    pub target_units: u64,
    pub window_minutes: f64,
    pub enqueued: u64,
    pub processed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::from_parts(RunConfig::default(), 0, 0)
    }
}

impl RunState {
    pub fn from_parts(config: RunConfig, enqueued: u64, processed: u64) -> Self {
        Self {
            running: config.running,
            target_units: config.target_units,
            window_minutes: config.window_minutes,
            enqueued,
            processed,
            started_at: config.started_at,
        }
    }

    /// The configuration part, without counters
    pub fn config(&self) -> RunConfig {
        RunConfig {
            running: self.running,
            target_units: self.target_units,
            window_minutes: self.window_minutes,
            started_at: self.started_at,
        }
    }

    /// Jobs admitted but not yet counted as processed
    ///
    /// Saturates at zero: redelivered jobs can push `processed` past `enqueued`.
    pub fn in_flight(&self) -> u64 {
        self.enqueued.saturating_sub(self.processed)
    }

    /// Configured admission rate in units per minute, if the window is usable
    pub fn rate_per_minute(&self) -> Option<f64> {
        if self.window_minutes > 0.0 && self.window_minutes.is_finite() {
            Some(self.target_units as f64 / self.window_minutes)
        } else {
            None
        }
    }
}

/// The serialized configuration blob stored under the run key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub running: bool,
    pub target_units: u64,
    pub window_minutes: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Partial update of the run configuration; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatePatch {
    pub running: Option<bool>,
    pub target_units: Option<u64>,
    pub window_minutes: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
}

impl RunStatePatch {
    pub fn running(running: bool) -> Self {
        Self {
            running: Some(running),
            ..Self::default()
        }
    }

    pub fn rate(target_units: u64, window_minutes: f64) -> Self {
        Self {
            target_units: Some(target_units),
            window_minutes: Some(window_minutes),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, config: &mut RunConfig) {
        if let Some(running) = self.running {
            config.running = running;
        }
        if let Some(target_units) = self.target_units {
            config.target_units = target_units;
        }
        if let Some(window_minutes) = self.window_minutes {
            config.window_minutes = window_minutes;
        }
        if let Some(started_at) = self.started_at {
            config.started_at = Some(started_at);
        }
    }
}

/// Independent atomic counters kept by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Counter {
    Enqueued,
    Processed,
    NextJobId,
}
