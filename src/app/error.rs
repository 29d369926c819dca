//! Application level errors

use crate::config::ConfigError;
use crate::control::ControlError;
use crate::core::error_handling::ContextualError;
use crate::progress::ProgressError;
use crate::worker::SinkError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error("Invalid {field}: {message}")]
    InvalidArgument { field: &'static str, message: String },
}

pub type AppResult<T> = Result<T, AppError>;

impl ContextualError for AppError {
    fn is_user_actionable(&self) -> bool {
        match self {
            AppError::Config(e) => e.is_user_actionable(),
            AppError::Control(e) => e.is_user_actionable(),
            AppError::Sink(e) => e.is_user_actionable(),
            AppError::Progress(e) => e.is_user_actionable(),
            AppError::InvalidArgument { .. } => true,
        }
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Control(e) => e.user_message(),
            AppError::Sink(e) => e.user_message(),
            AppError::Progress(e) => e.user_message(),
            AppError::InvalidArgument { message, .. } => Some(message),
        }
    }
}
