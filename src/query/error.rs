//! Query parsing errors.

use thiserror::Error;

/// Result type for query parsing.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors from parsing predicates, sort specs and projections.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("{what} must be an object, got {found}")]
    NotAnObject { what: &'static str, found: String },

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("invalid operand for {operator}: {reason}")]
    InvalidOperand {
        operator: String,
        reason: String,
    },

    #[error("invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("invalid sort: {0}")]
    InvalidSort(String),

    #[error("invalid projection: {0}")]
    InvalidProjection(String),
}

impl QueryError {
    pub(crate) fn operand(operator: &str, reason: impl Into<String>) -> Self {
        QueryError::InvalidOperand {
            operator: operator.to_string(),
            reason: reason.into(),
        }
    }
}
