//! HTTP sink against a canned-response server

use crate::core::retry::RetryPolicy;
use crate::worker::{DocumentStoreSink, JobResult, ResultSink, SinkError, UpsertOutcome};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Answers each request with the next canned `(status, body)` and records `"METHOD /path"`
struct CannedServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

async fn serve(responses: Vec<(u16, &'static str)>) -> CannedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();
    let mut responses: VecDeque<(u16, &'static str)> = responses.into();

    tokio::spawn(async move {
        while let Some((status, body)) = responses.pop_front() {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let head = read_request(&mut socket).await;
            let request_line = head.lines().next().unwrap_or_default().to_string();
            let mut parts = request_line.split_whitespace();
            recorded.lock().unwrap().push(format!(
                "{} {}",
                parts.next().unwrap_or_default(),
                parts.next().unwrap_or_default()
            ));

            let response = format!(
                "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    CannedServer { base_url, requests }
}

/// Read headers and any content-length body, returning the header block
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let read = socket.read(&mut chunk).await.unwrap_or(0);
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        let text = String::from_utf8_lossy(&buffer).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= end + 4 + content_length {
                return text[..end].to_string();
            }
        }
    }
    String::from_utf8_lossy(&buffer).to_string()
}

fn result(job_id: u64) -> JobResult {
    JobResult {
        job_id,
        run_id: "run".to_string(),
        input: 3,
        output: 9,
        processed_at: Utc::now(),
        enqueued_at: Utc::now(),
    }
}

#[test]
fn test_rejects_non_http_urls() {
    assert!(matches!(
        DocumentStoreSink::new("ftp://example", "jobs"),
        Err(SinkError::Internal { .. })
    ));
}

#[tokio::test]
async fn test_upsert_maps_created_and_updated() {
    let server = serve(vec![(201, r#"{"result":"created"}"#), (200, r#"{"result":"updated"}"#)]).await;
    let sink = DocumentStoreSink::new(&server.base_url, "jobs").unwrap();

    assert_eq!(sink.upsert(&result(4)).await.unwrap(), UpsertOutcome::Created);
    assert_eq!(sink.upsert(&result(4)).await.unwrap(), UpsertOutcome::Updated);

    assert_eq!(
        *server.requests.lock().unwrap(),
        vec!["PUT /jobs/_doc/4".to_string(), "PUT /jobs/_doc/4".to_string()]
    );
}

#[tokio::test]
async fn test_upsert_surfaces_error_status() {
    let server = serve(vec![(503, r#"{"error":"unavailable"}"#)]).await;
    let sink = DocumentStoreSink::new(&server.base_url, "jobs").unwrap();

    match sink.upsert(&result(1)).await {
        Err(SinkError::Status { status, body, .. }) => {
            assert_eq!(status, 503);
            assert!(body.contains("unavailable"));
        }
        other => panic!("expected status error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_count_reads_count_field() {
    let server = serve(vec![(200, r#"{"count":42,"_shards":{}}"#)]).await;
    let sink = DocumentStoreSink::new(&format!("{}/", server.base_url), "jobs").unwrap();

    assert_eq!(sink.count().await.unwrap(), 42);
    assert_eq!(*server.requests.lock().unwrap(), vec!["GET /jobs/_count".to_string()]);
}

#[tokio::test]
async fn test_ensure_index_creates_missing_index() {
    let server = serve(vec![(404, ""), (200, r#"{"acknowledged":true}"#)]).await;
    let sink = DocumentStoreSink::new(&server.base_url, "jobs").unwrap();

    sink.ensure_index().await.unwrap();

    assert_eq!(
        *server.requests.lock().unwrap(),
        vec!["HEAD /jobs".to_string(), "PUT /jobs".to_string()]
    );
}

#[tokio::test]
async fn test_ensure_index_leaves_existing_index() {
    let server = serve(vec![(200, "")]).await;
    let sink = DocumentStoreSink::new(&server.base_url, "jobs").unwrap();

    sink.ensure_index().await.unwrap();

    assert_eq!(*server.requests.lock().unwrap(), vec!["HEAD /jobs".to_string()]);
}

#[tokio::test]
async fn test_ensure_index_retries_transient_failures() {
    let server = serve(vec![(500, ""), (200, "")]).await;
    let sink = DocumentStoreSink::new(&server.base_url, "jobs").unwrap();
    let policy = RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(5),
    };

    sink.ensure_index_with_retry(policy).await.unwrap();

    assert_eq!(server.requests.lock().unwrap().len(), 2);
}
