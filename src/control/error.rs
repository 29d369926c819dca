//! Run control error types

use crate::state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Invalid {field}: {message}")]
    InvalidArgument { field: &'static str, message: String },

    #[error("A run is already active")]
    AlreadyRunning,

    #[error("{in_flight} job(s) from the previous run are still in flight")]
    JobsInFlight { in_flight: u64 },

    #[error("No run is active")]
    NotRunning,

    #[error(transparent)]
    State(#[from] StateError),
}

pub type ControlResult<T> = Result<T, ControlError>;

impl crate::core::error_handling::ContextualError for ControlError {
    fn is_user_actionable(&self) -> bool {
        !matches!(self, ControlError::State(_))
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ControlError::InvalidArgument { message, .. } => Some(message),
            ControlError::AlreadyRunning => Some("A run is already active; stop it first"),
            ControlError::JobsInFlight { .. } => {
                Some("Jobs from the previous run are still in flight; wait for them to drain")
            }
            ControlError::NotRunning => Some("No run is active; start one first"),
            ControlError::State(_) => None,
        }
    }
}
