//! Index definitions and key extraction.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use super::types::{KeyKind, KeyPattern};
use crate::storage::key::{compare_keys, IndexKey, KeyValue};
use crate::storage::path::values_through_arrays;

/// Request to build an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub key_pattern: KeyPattern,
    pub name: Option<String>,
    pub sparse: bool,
}

impl IndexSpec {
    pub fn new(key_pattern: KeyPattern) -> Self {
        Self {
            key_pattern,
            name: None,
            sparse: false,
        }
    }

    /// Set an explicit name instead of the conventional one.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set sparse flag.
    pub fn sparse(mut self, value: bool) -> Self {
        self.sparse = value;
        self
    }

    /// Effective index name.
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.key_pattern.default_name())
    }
}

/// Keys one document contributes to an index.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedKeys {
    pub keys: Vec<IndexKey>,
    /// true when some array value was expanded into several entries
    pub multikey: bool,
}

/// A built index as seen by the planner.
///
/// The multikey flag starts false and flips to true, never back, the first
/// time a document with an array value on an indexed path is stored.
#[derive(Debug)]
pub struct IndexDescriptor {
    name: String,
    key_pattern: KeyPattern,
    sparse: bool,
    multikey: AtomicBool,
}

impl IndexDescriptor {
    pub fn new(spec: &IndexSpec) -> Self {
        Self {
            name: spec.name(),
            key_pattern: spec.key_pattern.clone(),
            sparse: spec.sparse,
            multikey: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_pattern(&self) -> &KeyPattern {
        &self.key_pattern
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    pub fn is_multikey(&self) -> bool {
        self.multikey.load(Ordering::Acquire)
    }

    pub(crate) fn mark_multikey(&self) {
        self.multikey.store(true, Ordering::Release);
    }

    /// Plugin name when this is a special index.
    pub fn special_kind(&self) -> Option<&str> {
        self.key_pattern.special_kind()
    }

    /// Keys for a document.
    ///
    /// Missing fields index as null; a sparse index skips documents missing
    /// every indexed field. Arrays on B-tree fields expand to one key per
    /// element, and a path through an array also marks the index multikey.
    /// Special fields keep the raw value.
    pub fn extract_keys(&self, doc: &Value) -> ExtractedKeys {
        let mut multikey = false;
        let mut any_present = false;
        let mut per_field: Vec<Vec<KeyValue>> = Vec::with_capacity(self.key_pattern.len());

        for field in self.key_pattern.fields() {
            let (leaves, expanded) = values_through_arrays(doc, &field.path);
            any_present |= !leaves.is_empty();
            if expanded && matches!(field.kind, KeyKind::Ascending | KeyKind::Descending) {
                multikey = true;
            }

            let mut components = Vec::new();
            for leaf in leaves {
                match (leaf, &field.kind) {
                    (Value::Array(items), KeyKind::Ascending | KeyKind::Descending) => {
                        multikey = true;
                        if items.is_empty() {
                            components.push(KeyValue::Value(leaf.clone()));
                        } else {
                            components.extend(items.iter().cloned().map(KeyValue::Value));
                        }
                    }
                    _ => components.push(KeyValue::Value(leaf.clone())),
                }
            }
            if components.is_empty() {
                components.push(KeyValue::Value(Value::Null));
            }
            per_field.push(components);
        }

        if self.sparse && !any_present {
            return ExtractedKeys {
                keys: Vec::new(),
                multikey: false,
            };
        }

        let mut keys: Vec<IndexKey> = vec![Vec::new()];
        for components in per_field {
            keys = keys
                .into_iter()
                .flat_map(|prefix| {
                    components.iter().map(move |c| {
                        let mut key = prefix.clone();
                        key.push(c.clone());
                        key
                    })
                })
                .collect();
        }

        let directions = self.key_pattern.directions();
        keys.sort_by(|a, b| compare_keys(a, b, &directions));
        keys.dedup();

        ExtractedKeys { keys, multikey }
    }
}
