//! Planning errors.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::query::QueryError;

/// Result type for planning operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Query planning errors.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("bad hint: {0}")]
    BadHint(String),

    #[error("bad min/max: {0}")]
    BadMinMax(String),

    #[error("special index plans not allowed here: {0}")]
    SpecialNotAllowed(String),

    #[error("no index of type {0} to answer this query")]
    SpecialIndexNotFound(String),

    #[error("index number {index} out of range ({count} indexes)")]
    InvalidIndexNumber { index: usize, count: usize },

    #[error("query interrupted: {0}")]
    Interrupted(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PlanError {
    /// Errors caused by the request itself; reported to the user as is.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PlanError::Query(_)
                | PlanError::BadHint(_)
                | PlanError::BadMinMax(_)
                | PlanError::SpecialNotAllowed(_)
                | PlanError::SpecialIndexNotFound(_)
        )
    }

    /// Broken internal invariants; fatal to the operation only.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            PlanError::InvalidIndexNumber { .. } | PlanError::Internal(_)
        )
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, PlanError::Interrupted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let hint = PlanError::BadHint("no such index".to_string());
        assert!(hint.is_user_error());
        assert!(!hint.is_invariant_violation());

        let invariant = PlanError::InvalidIndexNumber { index: 3, count: 1 };
        assert!(invariant.is_invariant_violation());
        assert!(!invariant.is_user_error());
        assert_eq!(invariant.to_string(), "index number 3 out of range (1 indexes)");

        assert!(PlanError::Interrupted("killed".to_string()).is_interrupted());
        assert!(PlanError::from(QueryError::UnknownOperator("$x".to_string())).is_user_error());
    }
}
