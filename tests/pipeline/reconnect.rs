//! Broker outages during a run

use crate::common::{backlogged_pipeline, eventually, fast_config, started_pipeline};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_admission_resumes_after_broker_outage() {
    let pipeline = started_pipeline(fast_config(2)).await;
    let broker = pipeline.broker().clone();

    pipeline.control().start(600, 0.1).await.unwrap();
    assert!(
        eventually(Duration::from_secs(2), || async {
            pipeline.control().status().await.enqueued > 0
        })
        .await
    );

    broker.set_online(false).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!pipeline.producer().is_connected());
    let during_outage = pipeline.control().status().await.enqueued;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(pipeline.control().status().await.enqueued, during_outage);

    broker.set_online(true).unwrap();
    assert!(pipeline.producer().wait_until_ready(Duration::from_secs(2)).await);
    assert!(
        eventually(Duration::from_secs(2), || async {
            pipeline.control().status().await.enqueued > during_outage
        })
        .await
    );

    pipeline.control().stop().await.unwrap();
    assert!(pipeline.drain(Duration::from_secs(5)).await);
    let state = pipeline.control().status().await;
    assert!(state.processed >= state.enqueued);
    assert_eq!(pipeline.sink().count().await.unwrap(), state.enqueued);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_connections_redeliver_unacked_jobs() {
    let pipeline = backlogged_pipeline(Duration::from_millis(30)).await;
    let broker = pipeline.broker().clone();

    pipeline.control().start(600, 0.1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(broker.drop_connections().unwrap() >= 2);
    tokio::time::sleep(Duration::from_millis(100)).await;
    pipeline.control().stop().await.unwrap();

    assert!(pipeline.drain(Duration::from_secs(10)).await);
    let state = pipeline.control().status().await;
    assert!(state.processed >= state.enqueued);
    assert_eq!(pipeline.sink().count().await.unwrap(), state.enqueued);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queued_jobs_survive_broker_restart() {
    let pipeline = backlogged_pipeline(Duration::from_millis(30)).await;
    let broker = pipeline.broker().clone();
    let queue = pipeline.config().broker.queue.clone();

    pipeline.control().start(600, 0.1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    pipeline.control().stop().await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let queued = broker.queue_depth(&queue).unwrap();
    assert!(queued > 0);

    broker.restart().unwrap();

    assert!(broker.queue_depth(&queue).unwrap() + broker.unacked_count(&queue).unwrap() >= queued);
    assert!(pipeline.drain(Duration::from_secs(10)).await);
    let state = pipeline.control().status().await;
    assert!(state.processed >= state.enqueued);

    pipeline.shutdown().await;
}
