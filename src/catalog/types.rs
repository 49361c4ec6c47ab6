//! Index key patterns.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{CatalogError, CatalogResult};

/// Ordering kind of one key pattern field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// Ascending B-tree field (`1`).
    Ascending,
    /// Descending B-tree field (`-1`).
    Descending,
    /// Field handled by a special index plugin, e.g. `"2d"`.
    Special(String),
}

/// One field of an index key pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyField {
    /// Dotted field path.
    pub path: String,
    pub kind: KeyKind,
}

impl KeyField {
    pub fn ascending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: KeyKind::Ascending,
        }
    }

    pub fn descending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: KeyKind::Descending,
        }
    }

    /// Sign of the field: -1 for descending, 1 otherwise.
    pub fn direction(&self) -> i32 {
        match self.kind {
            KeyKind::Descending => -1,
            _ => 1,
        }
    }

    pub fn is_special(&self) -> bool {
        matches!(self.kind, KeyKind::Special(_))
    }

    fn to_json(&self) -> Value {
        match &self.kind {
            KeyKind::Ascending => Value::from(1),
            KeyKind::Descending => Value::from(-1),
            KeyKind::Special(name) => Value::from(name.as_str()),
        }
    }
}

/// Ordered list of indexed fields, e.g. `{a: 1, b: -1}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPattern {
    fields: Vec<KeyField>,
}

impl KeyPattern {
    /// Build a key pattern, rejecting empty and duplicate field lists.
    pub fn new(fields: Vec<KeyField>) -> CatalogResult<Self> {
        if fields.is_empty() {
            return Err(CatalogError::InvalidKeyPattern("no fields".to_string()));
        }
        for (i, field) in fields.iter().enumerate() {
            if field.path.starts_with('$') {
                return Err(CatalogError::InvalidKeyPattern(format!(
                    "field cannot start with '$': {}",
                    field.path
                )));
            }
            if fields[..i].iter().any(|f| f.path == field.path) {
                return Err(CatalogError::InvalidKeyPattern(format!(
                    "duplicate field: {}",
                    field.path
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Parse `{a: 1, b: -1, loc: "2d"}`.
    pub fn from_json(value: &Value) -> CatalogResult<Self> {
        let map = value.as_object().ok_or_else(|| {
            CatalogError::InvalidKeyPattern(format!("expected an object, got {}", value))
        })?;
        let fields = map
            .iter()
            .map(|(path, kind)| {
                let kind = match kind {
                    Value::Number(n) if n.as_f64().is_some_and(|d| d < 0.0) => KeyKind::Descending,
                    Value::Number(_) => KeyKind::Ascending,
                    Value::String(name) => KeyKind::Special(name.clone()),
                    other => {
                        return Err(CatalogError::InvalidKeyPattern(format!(
                            "bad value for {}: {}",
                            path, other
                        )))
                    }
                };
                Ok(KeyField {
                    path: path.clone(),
                    kind,
                })
            })
            .collect::<CatalogResult<Vec<_>>>()?;
        Self::new(fields)
    }

    pub fn fields(&self) -> &[KeyField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn first_field(&self) -> &KeyField {
        &self.fields[0]
    }

    pub fn contains_field(&self, path: &str) -> bool {
        self.fields.iter().any(|f| f.path == path)
    }

    pub fn directions(&self) -> Vec<i32> {
        self.fields.iter().map(KeyField::direction).collect()
    }

    /// Plugin name of the first special field, if any.
    pub fn special_kind(&self) -> Option<&str> {
        self.fields.iter().find_map(|f| match &f.kind {
            KeyKind::Special(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Conventional index name: `a_1_b_-1`.
    pub fn default_name(&self) -> String {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|f| match &f.kind {
                KeyKind::Ascending => format!("{}_1", f.path),
                KeyKind::Descending => format!("{}_-1", f.path),
                KeyKind::Special(name) => format!("{}_{}", f.path, name),
            })
            .collect();
        parts.join("_")
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.path.clone(), f.to_json()))
            .collect();
        Value::Object(map)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
