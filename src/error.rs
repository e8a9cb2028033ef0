use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Task API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task {task_id} was deleted but its column could not be relinked: {message}")]
    PartialDelete { task_id: Uuid, message: String },
}

impl AppError {
    /// Failures of the persistence call. The caller may retry them; nothing
    /// was applied locally. `PartialDelete` is not one of them: the delete
    /// went through and the board needs a repair.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AppError::Network(_) | AppError::Api { .. })
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!("Invariant violation: {}", message);
        AppError::InvariantViolation(message)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
