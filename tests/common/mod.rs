//! Shared helpers for pipeline integration tests

use async_trait::async_trait;
use jobpacer::app::Pipeline;
use jobpacer::config::PipelineConfig;
use jobpacer::core::shutdown::ShutdownCoordinator;
use jobpacer::worker::{JobResult, MemorySink, ResultSink, SinkResult, UpsertOutcome};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Defaults with a 20ms tick and a 50ms reconnect delay
pub fn fast_config(workers: usize) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.scheduler.tick_interval_ms = 20;
    config.broker.reconnect_delay_ms = 50;
    config.worker.instances = workers;
    config
}

pub async fn started_pipeline(config: PipelineConfig) -> Pipeline {
    let mut pipeline = Pipeline::build(config, ShutdownCoordinator::new())
        .await
        .expect("pipeline should build");
    pipeline.start().await.expect("pipeline should start");
    pipeline
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}

/// Memory sink that takes `delay` per write, to keep jobs queued
pub struct SlowSink {
    pub inner: MemorySink,
    pub delay: Duration,
}

impl SlowSink {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemorySink::new(),
            delay,
        }
    }
}

#[async_trait]
impl ResultSink for SlowSink {
    async fn upsert(&self, result: &JobResult) -> SinkResult<UpsertOutcome> {
        tokio::time::sleep(self.delay).await;
        self.inner.upsert(result).await
    }

    async fn count(&self) -> SinkResult<u64> {
        self.inner.count().await
    }

    fn describe(&self) -> String {
        format!("slow {}", self.inner.describe())
    }
}

/// Started pipeline whose single worker holds one job at a time and writes slowly
pub async fn backlogged_pipeline(delay: Duration) -> Pipeline {
    let mut config = fast_config(1);
    config.worker.prefetch = 1;
    let mut pipeline = Pipeline::with_sink(
        config,
        Arc::new(SlowSink::new(delay)),
        ShutdownCoordinator::new(),
    )
    .expect("pipeline should build");
    pipeline.start().await.expect("pipeline should start");
    pipeline
}
