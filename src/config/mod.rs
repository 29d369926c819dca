//! Pipeline configuration
//!
//! Loaded from TOML (`dirs::config_dir()/Jobpacer/jobpacer.toml` unless a
//! file is named explicitly), then overridden by command line flags. Every
//! section and key is optional:
//!
//! ```toml
//! [broker]
//! url = "memory://"
//! queue = "jobpacer.jobs"
//! reconnect_delay_ms = 5000
//! max_pending = 10000
//!
//! [store]
//! url = "memory://"
//! progress_channel = "jobpacer:progress"
//! enqueue_publish_every = 10
//! processed_publish_every = 1
//!
//! [scheduler]
//! tick_interval_ms = 1000
//!
//! [worker]
//! prefetch = 10
//! instances = 1
//! sink_url = "memory://"          # or http(s)://host:port
//! sink_index = "jobpacer-jobs"
//!
//! [logging]
//! level = "info"
//! format = "text"                 # text | ext | json
//! ```

mod error;

pub use error::{ConfigError, ConfigResult};

use crate::broker::BrokerSettings;
use crate::state::StoreSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MEMORY_URL: &str = "memory://";

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];
const LOG_FORMATS: [&str; 3] = ["text", "ext", "json"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub broker: BrokerConfig,
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    pub url: String,
    pub queue: String,
    pub reconnect_delay_ms: u64,
    /// Ready messages per queue before publishing reports a full buffer
    pub max_pending: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: MEMORY_URL.to_string(),
            queue: "jobpacer.jobs".to_string(),
            reconnect_delay_ms: 5000,
            max_pending: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub url: String,
    pub progress_channel: String,
    pub enqueue_publish_every: u64,
    pub processed_publish_every: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let settings = StoreSettings::default();
        Self {
            url: MEMORY_URL.to_string(),
            progress_channel: settings.progress_channel,
            enqueue_publish_every: settings.enqueue_publish_every,
            processed_publish_every: settings.processed_publish_every,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    pub prefetch: u16,
    pub instances: usize,
    pub sink_url: String,
    pub sink_index: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            prefetch: 10,
            instances: 1,
            sink_url: MEMORY_URL.to_string(),
            sink_index: "jobpacer-jobs".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
        }
    }
}

/// Where job results are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEndpoint {
    Memory,
    DocumentStore { base_url: String, index: String },
}

impl PipelineConfig {
    /// `<config dir>/Jobpacer/jobpacer.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Jobpacer").join("jobpacer.toml"))
    }

    /// Load from an explicit file (which must exist), else the default file if present, else defaults
    ///
    /// Returns the configuration and the file it came from.
    pub async fn load(explicit: Option<&Path>) -> ConfigResult<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.exists()),
        };

        let Some(path) = path else {
            return Ok((Self::default(), None));
        };
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
        let config = Self::parse(&contents).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: Some(path.clone()),
                message,
            },
            other => other,
        })?;
        Ok((config, Some(path)))
    }

    /// Parse and validate TOML text
    pub fn parse(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: None,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        require_memory("broker.url", &self.broker.url)?;
        require_memory("store.url", &self.store.url)?;
        require_non_empty("broker.queue", &self.broker.queue)?;
        require_positive("broker.reconnect_delay_ms", self.broker.reconnect_delay_ms)?;
        require_positive("broker.max_pending", self.broker.max_pending as u64)?;
        require_non_empty("store.progress_channel", &self.store.progress_channel)?;
        require_positive("store.enqueue_publish_every", self.store.enqueue_publish_every)?;
        require_positive("store.processed_publish_every", self.store.processed_publish_every)?;
        require_positive("scheduler.tick_interval_ms", self.scheduler.tick_interval_ms)?;
        require_positive("worker.prefetch", self.worker.prefetch as u64)?;
        require_positive("worker.instances", self.worker.instances as u64)?;
        require_non_empty("worker.sink_index", &self.worker.sink_index)?;

        let sink_url = &self.worker.sink_url;
        if sink_url != MEMORY_URL
            && !sink_url.starts_with("http://")
            && !sink_url.starts_with("https://")
        {
            return Err(invalid(
                "worker.sink_url",
                format!(
                    "worker.sink_url must be {} or an http(s):// URL, got '{}'",
                    MEMORY_URL, sink_url
                ),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "logging.level",
                format!(
                    "logging.level must be one of {}, got '{}'",
                    LOG_LEVELS.join(", "),
                    self.logging.level
                ),
            ));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(invalid(
                "logging.format",
                format!(
                    "logging.format must be one of {}, got '{}'",
                    LOG_FORMATS.join(", "),
                    self.logging.format
                ),
            ));
        }
        Ok(())
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            queue: self.broker.queue.clone(),
            reconnect_delay: Duration::from_millis(self.broker.reconnect_delay_ms),
        }
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            progress_channel: self.store.progress_channel.clone(),
            enqueue_publish_every: self.store.enqueue_publish_every,
            processed_publish_every: self.store.processed_publish_every,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_interval_ms)
    }

    pub fn sink_endpoint(&self) -> SinkEndpoint {
        if self.worker.sink_url == MEMORY_URL {
            SinkEndpoint::Memory
        } else {
            SinkEndpoint::DocumentStore {
                base_url: self.worker.sink_url.clone(),
                index: self.worker.sink_index.clone(),
            }
        }
    }

    /// Render as TOML, as shown by `show-config`
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Render {
            message: e.to_string(),
        })
    }
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message,
    }
}

fn require_positive(field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(invalid(field, format!("{} must be greater than 0", field)));
    }
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(invalid(field, format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Only the in-process broker and store ship with this build
fn require_memory(field: &str, value: &str) -> ConfigResult<()> {
    if value != MEMORY_URL {
        return Err(invalid(
            field,
            format!("{} must be {}, got '{}'", field, MEMORY_URL, value),
        ));
    }
    Ok(())
}
