//! Error types for Pressroom

use thiserror::Error;

/// Result type alias for Pressroom operations
pub type Result<T> = std::result::Result<T, PressroomError>;

/// Main error type for Pressroom
#[derive(Error, Debug)]
pub enum PressroomError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Upstream source error: {0}")]
    Upstream(String),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PressroomError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PressroomError::Upstream(_) | PressroomError::ObjectStore(_) | PressroomError::Http(_)
        )
    }

    /// Whether the error aborts a sync run, as opposed to skipping one item.
    /// Item-level faults are recorded in the run report and the batch continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PressroomError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PressroomError::Upstream("503".into()).is_retryable());
        assert!(PressroomError::ObjectStore("timeout".into()).is_retryable());
        assert!(!PressroomError::NotFound("x".into()).is_retryable());
        assert!(!PressroomError::Validation("bad frontmatter".into()).is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(PressroomError::Config("no bucket".into()).is_fatal());
        assert!(!PressroomError::Upstream("503".into()).is_fatal());
    }
}
