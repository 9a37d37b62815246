//! Storage error types.

use thiserror::Error;

/// Errors raised at the persistence boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness or versioning conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A serialization or deserialization error.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A backend-specific failure.
    #[error("backend: {0}")]
    Backend(String),
}

impl StorageError {
    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a conflict error.
    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formatting() {
        assert_eq!(
            StorageError::not_found("execution abc").to_string(),
            "not found: execution abc"
        );
        assert_eq!(
            StorageError::conflict("pause already exists").to_string(),
            "conflict: pause already exists"
        );
    }
}
