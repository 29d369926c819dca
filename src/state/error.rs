//! State store error types

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("State store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Run state could not be encoded or decoded: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("Internal state store error: {message}")]
    Internal { message: String },
}

/// Result type for state store operations
pub type StateResult<T> = Result<T, StateError>;

impl crate::core::error_handling::ContextualError for StateError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}
