//! Worker and sink error types

use crate::broker::BrokerError;
use crate::core::error_handling::ContextualError;
use crate::state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Sink answered {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected sink response: {message}")]
    Decode { message: String },

    #[error("Sink unavailable: {message}")]
    Unavailable { message: String },

    #[error("Internal sink error: {message}")]
    Internal { message: String },
}

pub type SinkResult<T> = Result<T, SinkError>;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Malformed job message: {source}")]
    Malformed {
        #[from]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

pub type WorkerResult<T> = Result<T, WorkerError>;

impl ContextualError for SinkError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, SinkError::Http { .. } | SinkError::Status { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            SinkError::Http { .. } => Some("The result document store could not be reached"),
            SinkError::Status { .. } => Some("The result document store rejected a request"),
            _ => None,
        }
    }
}

impl ContextualError for WorkerError {
    fn is_user_actionable(&self) -> bool {
        match self {
            WorkerError::Sink(e) => e.is_user_actionable(),
            WorkerError::Broker(e) => e.is_user_actionable(),
            _ => false,
        }
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            WorkerError::Sink(e) => e.user_message(),
            WorkerError::Broker(e) => e.user_message(),
            _ => None,
        }
    }
}
