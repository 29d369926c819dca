//! Broker error types

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker unreachable at {endpoint}: {message}")]
    Unreachable { endpoint: String, message: String },

    #[error("Broker connection closed: {reason}")]
    ConnectionClosed { reason: String },

    #[error("Queue '{queue}' has not been declared")]
    QueueNotFound { queue: String },

    #[error("Unknown delivery tag {tag}")]
    UnknownDeliveryTag { tag: u64 },

    #[error("Channel setup hook failed: {message}")]
    HookFailed { message: String },

    #[error("Failed to encode job message: {source}")]
    Encode {
        #[from]
        source: serde_json::Error,
    },

    #[error("Internal broker error: {message}")]
    Internal { message: String },
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

impl crate::core::error_handling::ContextualError for BrokerError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, BrokerError::Unreachable { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            BrokerError::Unreachable { .. } => Some("The message broker could not be reached"),
            _ => None,
        }
    }
}
