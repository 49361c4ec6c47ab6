//! Index scan bounds derived from a range set.

use std::fmt;

use super::range::FieldInterval;
use super::set::FieldRangeSet;
use crate::catalog::KeyPattern;
use crate::storage::key::{format_key, IndexKey, KeyValue};

#[derive(Debug, Clone, PartialEq)]
struct VectorField {
    path: String,
    intervals: Vec<FieldInterval>,
    /// true when the scan visits this field's values in ascending order
    ascending: bool,
}

/// Per index field intervals, oriented for a scan direction.
///
/// A field is scanned in ascending value order when its key sign times the
/// scan direction is positive, otherwise descending; start and end keys
/// follow that orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRangeVector {
    fields: Vec<VectorField>,
    direction: i32,
}

impl FieldRangeVector {
    /// `direction` 0 is scanned forward.
    pub fn new(ranges: &FieldRangeSet, key_pattern: &KeyPattern, direction: i32) -> Self {
        let direction = if direction < 0 { -1 } else { 1 };
        let fields = key_pattern
            .fields()
            .iter()
            .map(|f| VectorField {
                path: f.path.clone(),
                intervals: ranges.range(&f.path).intervals().to_vec(),
                ascending: f.direction() * direction > 0,
            })
            .collect();
        Self { fields, direction }
    }

    pub fn direction(&self) -> i32 {
        self.direction
    }

    /// First key the scan may visit.
    pub fn start_key(&self) -> IndexKey {
        self.fields
            .iter()
            .map(|f| {
                let bound = if f.ascending {
                    f.intervals.first().map(|i| &i.lower.value)
                } else {
                    f.intervals.last().map(|i| &i.upper.value)
                };
                bound.cloned().unwrap_or(KeyValue::MinKey)
            })
            .collect()
    }

    /// Last key the scan may visit.
    pub fn end_key(&self) -> IndexKey {
        self.fields
            .iter()
            .map(|f| {
                let bound = if f.ascending {
                    f.intervals.last().map(|i| &i.upper.value)
                } else {
                    f.intervals.first().map(|i| &i.lower.value)
                };
                bound.cloned().unwrap_or(KeyValue::MinKey)
            })
            .collect()
    }

    /// True when every component of `key` falls inside its field's ranges.
    pub fn matches_key(&self, key: &[KeyValue]) -> bool {
        self.fields
            .iter()
            .zip(key.iter())
            .all(|(f, k)| f.intervals.iter().any(|i| i.contains(k)))
    }

    /// True when some field admits no value.
    pub fn is_empty(&self) -> bool {
        self.fields.iter().any(|f| f.intervals.is_empty())
    }
}

impl fmt::Display for FieldRangeVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", format_key(&self.start_key()), format_key(&self.end_key()))
    }
}
