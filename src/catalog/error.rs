//! Catalog errors.

use thiserror::Error;

use crate::storage::InvalidNameError;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors from index and namespace management.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("invalid key pattern: {0}")]
    InvalidKeyPattern(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("no plugin for special index type: {0}")]
    UnknownSpecialIndex(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("collection already exists: {0}")]
    CollectionAlreadyExists(String),

    #[error("invalid collection name: {0}")]
    InvalidName(#[from] InvalidNameError),
}

impl CatalogError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::IndexNotFound(_) | CatalogError::CollectionNotFound(_)
        )
    }

    /// check if this error is a conflict with existing state
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CatalogError::IndexAlreadyExists(_) | CatalogError::CollectionAlreadyExists(_)
        )
    }
}
