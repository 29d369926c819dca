//! Progress fanout error types

use crate::state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("Cannot subscribe to progress channel: {source}")]
    Subscribe {
        #[from]
        source: StateError,
    },

    #[error("Internal progress fanout error: {message}")]
    Internal { message: String },
}

pub type ProgressResult<T> = Result<T, ProgressError>;

impl crate::core::error_handling::ContextualError for ProgressError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}
