//! In-process pipeline assembly
//!
//! One state store, one broker, a producer connection driving the rate
//! controller, `worker.instances` consumers and the progress fanout, all
//! sharing a [`ShutdownCoordinator`].

use crate::app::AppResult;
use crate::broker::{ConnectionManager, MemoryBroker, NoopHook};
use crate::config::{PipelineConfig, SinkEndpoint};
use crate::control::RunControl;
use crate::core::retry::RetryPolicy;
use crate::core::shutdown::ShutdownCoordinator;
use crate::progress::ProgressFanout;
use crate::scheduler::RateController;
use crate::state::{MemoryStateBackend, StateStore};
use crate::worker::{DocumentStoreSink, MemorySink, ResultSink, StatsSnapshot, Worker};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const DRAIN_POLL: Duration = Duration::from_millis(50);
const READY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Pipeline {
    config: PipelineConfig,
    store: StateStore,
    state_backend: Arc<MemoryStateBackend>,
    broker: Arc<MemoryBroker>,
    sink: Arc<dyn ResultSink>,
    control: RunControl,
    fanout: ProgressFanout,
    producer: ConnectionManager,
    workers: Vec<Worker>,
    shutdown: ShutdownCoordinator,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Wire every component; nothing connects until [`Pipeline::start`]
    pub async fn build(config: PipelineConfig, shutdown: ShutdownCoordinator) -> AppResult<Self> {
        config.validate()?;
        let sink = build_sink(&config).await?;
        Self::with_sink(config, sink, shutdown)
    }

    /// Like [`Pipeline::build`] but writing results to `sink`, ignoring `worker.sink_url`
    pub fn with_sink(
        config: PipelineConfig,
        sink: Arc<dyn ResultSink>,
        shutdown: ShutdownCoordinator,
    ) -> AppResult<Self> {
        config.validate()?;

        let state_backend = Arc::new(MemoryStateBackend::new());
        let store = StateStore::new(state_backend.clone(), config.store_settings());
        let broker = Arc::new(MemoryBroker::new(config.broker.max_pending));
        info!("Results are written to {}", sink.describe());

        let workers = (1..=config.worker.instances)
            .map(|n| {
                Worker::new(
                    format!("worker-{}", n),
                    store.clone(),
                    sink.clone(),
                    broker.clone(),
                    config.broker_settings(),
                    config.worker.prefetch,
                )
            })
            .collect();
        let producer = ConnectionManager::new(
            "producer",
            broker.clone(),
            Arc::new(NoopHook),
            config.broker_settings(),
        );

        Ok(Self {
            control: RunControl::new(store.clone()),
            fanout: ProgressFanout::new(store.clone()),
            config,
            store,
            state_backend,
            broker,
            sink,
            producer,
            workers,
            shutdown,
            tasks: Vec::new(),
        })
    }

    /// Connect consumers and producer, then start the controller and fanout loops
    pub async fn start(&mut self) -> AppResult<()> {
        for worker in &self.workers {
            worker.start().await;
        }
        self.producer.start().await;
        if !self.producer.wait_until_ready(READY_TIMEOUT).await {
            warn!("Producer not connected yet; admission resumes once it is");
        }

        let fanout = self.fanout.clone().spawn(self.shutdown.subscribe()).await?;
        self.tasks.push(fanout);

        let controller = RateController::new(
            self.store.clone(),
            self.producer.clone(),
            self.config.tick_interval(),
        );
        self.tasks
            .push(tokio::spawn(controller.run(self.shutdown.subscribe())));

        info!(
            "Pipeline started: {} worker(s), prefetch {}, queue '{}'",
            self.workers.len(),
            self.config.worker.prefetch,
            self.config.broker.queue
        );
        Ok(())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn state_backend(&self) -> &Arc<MemoryStateBackend> {
        &self.state_backend
    }

    pub fn broker(&self) -> &Arc<MemoryBroker> {
        &self.broker
    }

    pub fn sink(&self) -> &Arc<dyn ResultSink> {
        &self.sink
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    pub fn fanout(&self) -> &ProgressFanout {
        &self.fanout
    }

    pub fn producer(&self) -> &ConnectionManager {
        &self.producer
    }

    /// Settlement counts summed over all workers
    pub fn worker_stats(&self) -> StatsSnapshot {
        self.workers
            .iter()
            .map(Worker::stats)
            .fold(StatsSnapshot::default(), |total, stats| total + stats)
    }

    /// Wait until every admitted job is processed and the queue is empty
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_drained().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }

    async fn is_drained(&self) -> bool {
        let state = self.store.get_state().await;
        let queue = &self.config.broker.queue;
        let queued = self.broker.queue_depth(queue).unwrap_or(0);
        let unacked = self.broker.unacked_count(queue).unwrap_or(0);
        debug!(
            "Drain check: {} in flight, {} queued, {} unacked",
            state.in_flight(),
            queued,
            unacked
        );
        state.in_flight() == 0 && queued == 0 && unacked == 0
    }

    /// Stop the loops, then release producer and worker connections
    pub async fn shutdown(self) {
        self.shutdown.trigger_shutdown();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Pipeline task ended abnormally: {}", e);
            }
        }
        self.producer.shutdown().await;
        for worker in &self.workers {
            worker.shutdown().await;
        }
        info!("Pipeline shut down");
    }
}

async fn build_sink(config: &PipelineConfig) -> AppResult<Arc<dyn ResultSink>> {
    match config.sink_endpoint() {
        SinkEndpoint::Memory => Ok(Arc::new(MemorySink::new())),
        SinkEndpoint::DocumentStore { base_url, index } => {
            let sink = DocumentStoreSink::new(&base_url, &index)?;
            sink.ensure_index_with_retry(RetryPolicy::default()).await?;
            Ok(Arc::new(sink))
        }
    }
}
