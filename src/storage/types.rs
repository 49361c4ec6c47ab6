//! core identity types for the storage layer.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use ulid::Ulid;

/// Identity of a stored document.
///
/// Record ids are generated from a monotonic ULID source per collection, so
/// their order matches insertion order. Deduplication across plans and
/// disjunction branches is by record id, never by document content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(Ulid);

impl RecordId {
    pub(crate) fn new(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// raw ULID
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored document together with its identity.
///
/// The document body is shared, cursors hand out cheap clones.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub doc: Arc<Value>,
}

impl Record {
    pub fn new(id: RecordId, doc: Value) -> Self {
        Self {
            id,
            doc: Arc::new(doc),
        }
    }

    /// get a top level field of the document
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.doc.get(field)
    }
}

/// A validated collection name (namespace).
///
/// Valid names:
/// - 1-120 characters
/// - no NUL characters, no `$`
/// - cannot start or end with a `.`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionName(String);

impl CollectionName {
    /// create a new CollectionName, validating the input
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        if name.len() > 120 {
            return Err(InvalidNameError::TooLong(name.len()));
        }

        for (i, c) in name.chars().enumerate() {
            if c == '\0' || c == '$' {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        if name.starts_with('.') || name.ends_with('.') {
            return Err(InvalidNameError::DotBoundary(name.to_string()));
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// errors from validating names
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidNameError {
    #[error("name cannot be empty")]
    Empty,

    #[error("name too long: {0} characters (max 120)")]
    TooLong(usize),

    #[error("invalid character '{char}' at position {position}")]
    InvalidCharacter { char: char, position: usize },

    #[error("name cannot start or end with '.': {0}")]
    DotBoundary(String),
}
