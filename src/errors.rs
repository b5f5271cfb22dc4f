use tracing::warn;

/// Domain error types for embedders of the quiz library. Services raise
/// these through `anyhow` and callers can downcast or classify with
/// `classify_storage_error`.
#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Question generation failed: {0}")]
    Generation(String),

    #[error("Resource already exists: {0}")]
    DuplicateResource(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<sqlx::Error> for QuizError {
    fn from(err: sqlx::Error) -> Self {
        QuizError::Storage(anyhow::Error::from(err))
    }
}

/// Map an anyhow chain coming out of the store into a `QuizError` by
/// sniffing the message, so callers get a duplicate/not-found/validation
/// classification instead of an opaque storage failure.
pub fn classify_storage_error(error: &anyhow::Error) -> QuizError {
    let message = error.to_string().to_lowercase();

    if message.contains("already exists") || message.contains("unique constraint") {
        if let Some(start) = message.find('\'') {
            if let Some(end) = message[start + 1..].find('\'') {
                let identifier = &message[start + 1..start + 1 + end];
                return QuizError::DuplicateResource(format!(
                    "Resource '{identifier}' already exists"
                ));
            }
        }
        QuizError::DuplicateResource("Resource already exists".to_string())
    } else if message.contains("not found") || message.contains("no rows") {
        QuizError::NotFound("Resource not found".to_string())
    } else if message.contains("required") || message.contains("cannot be null") {
        QuizError::Validation("Required field is missing or invalid".to_string())
    } else {
        warn!(error = %error, "Unclassified storage error");
        QuizError::Storage(anyhow::anyhow!("{error}"))
    }
}
