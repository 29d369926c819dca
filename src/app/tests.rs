//! Pipeline assembly tests over the in-process backends

use crate::app::cli::RunArgs;
use crate::app::startup::run_pipeline;
use crate::app::{AppError, Pipeline};
use crate::config::PipelineConfig;
use crate::core::shutdown::ShutdownCoordinator;
use std::time::Duration;

fn fast_config(workers: usize) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.scheduler.tick_interval_ms = 20;
    config.broker.reconnect_delay_ms = 50;
    config.worker.instances = workers;
    config
}

fn run_args(target: u64, window: f64, seconds: f64) -> RunArgs {
    RunArgs {
        target,
        window,
        duration: Some(seconds),
        workers: None,
        prefetch: None,
        tick_interval_ms: None,
        sink_url: None,
        drain_timeout: 5.0,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_processes_admitted_jobs() {
    let mut pipeline = Pipeline::build(fast_config(2), ShutdownCoordinator::new())
        .await
        .unwrap();
    pipeline.start().await.unwrap();

    // 600 units per 6 seconds: two jobs per 20ms tick
    pipeline.control().start(600, 0.1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    pipeline.control().stop().await.unwrap();

    assert!(pipeline.drain(Duration::from_secs(5)).await);
    let state = pipeline.control().status().await;
    assert!(!state.running);
    assert!(state.enqueued > 0);
    assert_eq!(state.processed, state.enqueued);
    assert_eq!(pipeline.sink().count().await.unwrap(), state.enqueued);
    assert_eq!(pipeline.worker_stats().acked, state.processed);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_shutdown_releases_connections() {
    let mut pipeline = Pipeline::build(fast_config(3), ShutdownCoordinator::new())
        .await
        .unwrap();
    pipeline.start().await.unwrap();
    let broker = pipeline.broker().clone();
    assert!(pipeline.producer().wait_until_ready(Duration::from_secs(1)).await);

    pipeline.shutdown().await;

    assert_eq!(broker.connection_count().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_pipeline_reports_summary() {
    let summary = run_pipeline(
        fast_config(1),
        &run_args(600, 0.1, 0.2),
        ShutdownCoordinator::new(),
    )
    .await
    .unwrap();

    assert!(summary.drained);
    assert!(!summary.state.running);
    assert!(summary.state.enqueued > 0);
    assert_eq!(summary.state.processed, summary.state.enqueued);
    assert_eq!(summary.stored_results, Some(summary.state.enqueued));
    assert_eq!(summary.stats.rejected, 0);
}

#[tokio::test]
async fn test_run_pipeline_rejects_non_positive_rate() {
    let result = run_pipeline(
        fast_config(1),
        &run_args(0, 1.0, 0.1),
        ShutdownCoordinator::new(),
    )
    .await;

    assert!(matches!(result, Err(AppError::InvalidArgument { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_signal_ends_run_without_drain() {
    let shutdown = ShutdownCoordinator::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger_shutdown();
    });

    let mut args = run_args(600, 0.1, 0.0);
    args.duration = None;
    let summary = run_pipeline(fast_config(1), &args, shutdown).await.unwrap();

    assert!(!summary.drained);
    assert!(!summary.state.running);
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let mut config = fast_config(1);
    config.worker.instances = 0;

    assert!(matches!(
        Pipeline::build(config, ShutdownCoordinator::new()).await,
        Err(AppError::Config(_))
    ));
}
