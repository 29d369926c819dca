//! Admission through to stored results

use crate::common::{eventually, fast_config, started_pipeline};
use jobpacer::app::Pipeline;
use jobpacer::core::shutdown::ShutdownCoordinator;
use jobpacer::scheduler::{run_id, workload_value};
use jobpacer::worker::MemorySink;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_admitted_job_is_stored_once() {
    let pipeline = started_pipeline(fast_config(3)).await;

    pipeline.control().start(1200, 0.1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    pipeline.control().stop().await.unwrap();
    assert!(pipeline.drain(Duration::from_secs(5)).await);

    let state = pipeline.control().status().await;
    assert!(state.enqueued >= 10, "only {} admitted", state.enqueued);
    assert_eq!(state.processed, state.enqueued);
    assert_eq!(pipeline.sink().count().await.unwrap(), state.enqueued);
    assert_eq!(pipeline.worker_stats().acked, state.enqueued);
    assert!(pipeline
        .broker()
        .dead_letters(&pipeline.config().broker.queue)
        .unwrap()
        .is_empty());

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_rate_admits_fractional_jobs_over_time() {
    let pipeline = started_pipeline(fast_config(1)).await;

    // 150 per minute is 0.05 jobs per 20ms tick: one job every 20 ticks
    pipeline.control().start(150, 1.0).await.unwrap();
    let admitted = eventually(Duration::from_secs(3), || async {
        pipeline.control().status().await.enqueued >= 2
    })
    .await;
    pipeline.control().stop().await.unwrap();

    assert!(admitted);
    let state = pipeline.control().status().await;
    assert!(state.enqueued <= 10, "{} admitted", state.enqueued);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_progress_reaches_listeners() {
    let pipeline = started_pipeline(fast_config(1)).await;
    let mut listener = pipeline
        .fanout()
        .connect_listener("dashboard", "test")
        .unwrap();

    pipeline.control().start(600, 0.1).await.unwrap();

    let mut saw_processed = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(200), listener.recv()).await {
            Ok(Some(snapshot)) if snapshot.processed > 0 => {
                saw_processed = true;
                break;
            }
            Ok(Some(_)) | Err(_) => continue,
            Ok(None) => break,
        }
    }
    pipeline.control().stop().await.unwrap();

    assert!(saw_processed);
    let stats = pipeline.fanout().listener_statistics("dashboard").unwrap();
    assert!(stats.delivered > 0);

    pipeline.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_results_carry_the_run_and_square_of_input() {
    let sink = Arc::new(MemorySink::new());
    let mut pipeline =
        Pipeline::with_sink(fast_config(2), sink.clone(), ShutdownCoordinator::new()).unwrap();
    pipeline.start().await.unwrap();

    let state = pipeline.control().start(600, 0.1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    pipeline.control().stop().await.unwrap();
    assert!(pipeline.drain(Duration::from_secs(5)).await);

    let run = run_id(&state);
    let enqueued = pipeline.control().status().await.enqueued;
    assert!(enqueued > 0);
    for job_id in 1..=enqueued {
        let result = sink
            .get(job_id)
            .unwrap()
            .unwrap_or_else(|| panic!("job {} missing from sink", job_id));
        assert_eq!(result.run_id, run);
        assert_eq!(result.input, workload_value(&run, job_id));
        assert_eq!(result.output, result.input * result.input);
        assert!(result.processed_at >= result.enqueued_at);
    }
    assert_eq!(sink.get(enqueued + 1).unwrap(), None);

    pipeline.shutdown().await;
}
