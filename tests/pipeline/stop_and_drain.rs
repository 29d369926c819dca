//! Stopping a run halts admission but not processing

use crate::common::{backlogged_pipeline, eventually};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_halts_admission_and_queued_jobs_still_complete() {
    let pipeline = backlogged_pipeline(Duration::from_millis(30)).await;

    pipeline.control().start(600, 0.1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    pipeline.control().stop().await.unwrap();

    // a tick already under way may still finish publishing
    tokio::time::sleep(Duration::from_millis(60)).await;
    let at_stop = pipeline.control().status().await;
    assert!(
        at_stop.in_flight() > 0,
        "expected a backlog, got {:?}",
        at_stop
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    let later = pipeline.control().status().await;
    assert_eq!(later.enqueued, at_stop.enqueued);
    assert!(later.processed >= at_stop.processed);

    assert!(pipeline.drain(Duration::from_secs(10)).await);
    let drained = pipeline.control().status().await;
    assert_eq!(drained.enqueued, at_stop.enqueued);
    assert_eq!(drained.processed, at_stop.enqueued);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_run_refused_until_backlog_drains() {
    let pipeline = backlogged_pipeline(Duration::from_millis(30)).await;

    pipeline.control().start(600, 0.1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    pipeline.control().stop().await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(pipeline.control().start(600, 0.1).await.is_err());

    let drained = eventually(Duration::from_secs(10), || async {
        pipeline.control().status().await.in_flight() == 0
    })
    .await;
    assert!(drained);
    let restarted = pipeline.control().start(60, 1.0).await.unwrap();
    assert_eq!(restarted.enqueued, 0);

    pipeline.control().stop().await.unwrap();
    pipeline.shutdown().await;
}
