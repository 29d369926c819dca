//! Generic error handling utilities
//!
//! Provides unified error reporting that works across the error types of the
//! individual pipeline components (state store, broker, worker, control).

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// Configuration and validation failures are user-actionable and carry a
/// message that is shown as-is. Connectivity and accounting failures are
/// system errors: they are reported with generic context and the details are
/// only emitted at debug level.
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)`; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a message the operator can act on
    fn is_user_actionable(&self) -> bool;

    /// Returns the specific user message if this is a user-actionable error
    fn user_message(&self) -> Option<&str>;
}

/// Log errors with appropriate detail level based on error specificity
///
/// # Examples
/// ```rust,no_run
/// # use jobpacer::core::error_handling::log_error_with_context;
/// # use jobpacer::config::ConfigError;
/// let err = ConfigError::Invalid {
///     field: "worker.prefetch".to_string(),
///     message: "worker.prefetch must be greater than 0".to_string(),
/// };
/// log_error_with_context(&err, "Loading configuration");
/// // Logs: "FATAL: worker.prefetch must be greater than 0"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => log::error!("FATAL: {}", user_msg),
        _ => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
