//! HTTP document-store sink
//!
//! Speaks the document API of an Elasticsearch-compatible store:
//! `PUT /{index}/_doc/{id}` for idempotent writes (201 created, 200 updated),
//! `HEAD`/`PUT /{index}` for index bootstrap and `GET /{index}/_count`.

use crate::core::retry::{retry_async, RetryPolicy};
use crate::worker::{JobResult, ResultSink, SinkError, SinkResult, UpsertOutcome};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DocumentStoreSink {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

impl DocumentStoreSink {
    pub fn new(base_url: &str, index: &str) -> SinkResult<Self> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(SinkError::Internal {
                message: format!(
                    "Invalid URL scheme. Only http:// and https:// are supported: {}",
                    base_url
                ),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SinkError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.base_url, self.index)
    }

    /// Create the index with field mappings unless it already exists
    pub async fn ensure_index(&self) -> SinkResult<()> {
        let url = self.index_url();
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|source| SinkError::Http {
                url: url.clone(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => {
                info!("Index '{}' already exists", self.index);
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                info!("Creating index '{}' with mappings", self.index);
                let response = self
                    .client
                    .put(&url)
                    .json(&index_definition())
                    .send()
                    .await
                    .map_err(|source| SinkError::Http {
                        url: url.clone(),
                        source,
                    })?;
                check_status(&url, response).await?;
                Ok(())
            }
            status => Err(SinkError::Status {
                url,
                status: status.as_u16(),
                body: String::new(),
            }),
        }
    }

    /// [`Self::ensure_index`] retried under `policy`
    pub async fn ensure_index_with_retry(&self, policy: RetryPolicy) -> SinkResult<()> {
        retry_async("ensure result index", policy, || self.ensure_index()).await
    }
}

fn index_definition() -> serde_json::Value {
    json!({
        "mappings": {
            "properties": {
                "jobId": { "type": "long" },
                "runId": { "type": "keyword" },
                "input": { "type": "long" },
                "output": { "type": "long" },
                "processedAt": { "type": "date" },
                "enqueuedAt": { "type": "date" }
            }
        }
    })
}

async fn check_status(url: &str, response: reqwest::Response) -> SinkResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SinkError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ResultSink for DocumentStoreSink {
    async fn upsert(&self, result: &JobResult) -> SinkResult<UpsertOutcome> {
        let url = format!("{}/_doc/{}", self.index_url(), result.job_id);
        let response = self
            .client
            .put(&url)
            .json(result)
            .send()
            .await
            .map_err(|source| SinkError::Http {
                url: url.clone(),
                source,
            })?;
        let response = check_status(&url, response).await?;

        let outcome = if response.status() == StatusCode::CREATED {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        };
        debug!("Job {} {} in '{}'", result.job_id, outcome, self.index);
        Ok(outcome)
    }

    async fn count(&self) -> SinkResult<u64> {
        let url = format!("{}/_count", self.index_url());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| SinkError::Http {
                url: url.clone(),
                source,
            })?;
        let body: serde_json::Value = check_status(&url, response)
            .await?
            .json()
            .await
            .map_err(|e| SinkError::Decode {
                message: e.to_string(),
            })?;

        body.get("count")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| SinkError::Decode {
                message: format!("no count in {}", body),
            })
    }

    fn describe(&self) -> String {
        self.index_url()
    }
}
