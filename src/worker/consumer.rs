//! Worker instances

use crate::broker::{
    BrokerResult, BrokerSettings, BrokerTransport, ChannelReadyHook, ConnectionManager,
    ReadyChannel,
};
use crate::state::StateStore;
use crate::worker::{JobProcessor, ResultSink, StatsSnapshot};
use async_trait::async_trait;
use log::info;
use std::sync::Arc;

/// Ready hook that caps in-flight deliveries and starts consuming
pub struct JobConsumer {
    processor: Arc<JobProcessor>,
    prefetch: u16,
}

impl JobConsumer {
    pub fn new(processor: Arc<JobProcessor>, prefetch: u16) -> Self {
        Self {
            processor,
            prefetch,
        }
    }
}

#[async_trait]
impl ChannelReadyHook for JobConsumer {
    async fn on_channel_ready(&self, channel: &ReadyChannel) -> BrokerResult<()> {
        channel.set_prefetch(self.prefetch).await?;
        channel.consume(self.processor.clone()).await?;
        info!(
            "Consuming '{}' with prefetch {}",
            channel.queue(),
            self.prefetch
        );
        Ok(())
    }
}

/// One consumer: a broker connection feeding a [`JobProcessor`]
pub struct Worker {
    name: String,
    processor: Arc<JobProcessor>,
    connection: ConnectionManager,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        store: StateStore,
        sink: Arc<dyn ResultSink>,
        transport: Arc<dyn BrokerTransport>,
        settings: BrokerSettings,
        prefetch: u16,
    ) -> Self {
        let name = name.into();
        let processor = Arc::new(JobProcessor::new(name.clone(), store, sink));
        let hook = Arc::new(JobConsumer::new(processor.clone(), prefetch));
        let connection = ConnectionManager::new(name.clone(), transport, hook, settings);
        Self {
            name,
            processor,
            connection,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connect and start consuming; connection failures are retried in the background
    pub async fn start(&self) {
        self.connection.start().await;
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.processor.stats()
    }

    pub async fn shutdown(&self) {
        self.connection.shutdown().await;
        let stats = self.stats();
        info!(
            "[{}] Stopped: {} acked, {} requeued, {} rejected",
            self.name, stats.acked, stats.requeued, stats.rejected
        );
    }
}
