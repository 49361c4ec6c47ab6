//! Storage layer error types

use thiserror::Error;

/// the main error type for storage operations
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// only JSON objects can be stored
    #[error("not a document: {0}")]
    NotADocument(String),

    /// the record id generator is exhausted for the current millisecond
    #[error("record id generation failed: {0}")]
    IdGeneration(String),

    /// the requested record was not found
    #[error("record not found: {0}")]
    RecordNotFound(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::RecordNotFound(_))
    }

    /// check if this error is recoverable by retry
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::IdGeneration(_))
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let missing = StorageError::RecordNotFound("01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string());
        assert!(missing.is_not_found());
        assert!(!missing.is_retriable());
        assert!(StorageError::IdGeneration("overflow".to_string()).is_retriable());
    }
}
