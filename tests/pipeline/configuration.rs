//! Pipelines built from configuration files

use jobpacer::app::{AppError, Pipeline};
use jobpacer::config::{ConfigError, PipelineConfig};
use jobpacer::core::shutdown::ShutdownCoordinator;
use std::io::Write;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_uses_configured_queue() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[broker]
queue = "custom.jobs"
reconnect_delay_ms = 50

[scheduler]
tick_interval_ms = 20

[worker]
instances = 2
prefetch = 3
"#
    )
    .unwrap();

    let (config, source) = PipelineConfig::load(Some(file.path())).await.unwrap();
    assert_eq!(source.as_deref(), Some(file.path()));

    let mut pipeline = Pipeline::build(config, ShutdownCoordinator::new())
        .await
        .unwrap();
    pipeline.start().await.unwrap();
    pipeline.control().start(600, 0.1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    pipeline.control().stop().await.unwrap();

    assert!(pipeline.drain(Duration::from_secs(5)).await);
    assert_eq!(pipeline.broker().consumer_count("custom.jobs").unwrap(), 2);
    assert!(pipeline.broker().queue_depth("jobpacer.jobs").is_err());

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_invalid_file_values_are_reported() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[scheduler]\ntick_interval_ms = 0").unwrap();

    match PipelineConfig::load(Some(file.path())).await {
        Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "scheduler.tick_interval_ms"),
        other => panic!("expected invalid value, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_unreachable_document_store_fails_build() {
    let mut config = PipelineConfig::default();
    config.worker.sink_url = "http://127.0.0.1:9".to_string();

    let result = Pipeline::build(config, ShutdownCoordinator::new()).await;

    assert!(matches!(result, Err(AppError::Sink(_))));
}
