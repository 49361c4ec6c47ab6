//! Query shape fingerprints used as plan cache keys.

use std::collections::BTreeMap;
use std::fmt;

use super::range::FieldRange;
use super::set::FieldRangeSet;
use crate::query::SortSpec;

/// How a predicate constrains one field, ignoring the literal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternKind {
    Equality,
    LowerBound,
    UpperBound,
    UpperAndLowerBound,
    /// Anything else: several intervals, no admissible value, or a special
    /// index operator.
    ConstraintPresent,
}

impl PatternKind {
    fn classify(range: &FieldRange) -> PatternKind {
        if range.special().is_some() || range.intervals().len() != 1 {
            return PatternKind::ConstraintPresent;
        }
        if range.is_equality() {
            return PatternKind::Equality;
        }
        let interval = &range.intervals()[0];
        match (interval.lower.value.is_min(), interval.upper.value.is_max()) {
            (false, true) => PatternKind::LowerBound,
            (true, false) => PatternKind::UpperBound,
            (false, false) => PatternKind::UpperAndLowerBound,
            (true, true) => PatternKind::ConstraintPresent,
        }
    }
}

/// Normalized shape of a predicate plus sort.
///
/// Two queries that differ only in literal values share a pattern, and so
/// share a plan cache slot. A sort and its full reverse share a pattern too.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryPattern {
    fields: BTreeMap<String, PatternKind>,
    sort: SortSpec,
}

impl QueryPattern {
    pub fn new(ranges: &FieldRangeSet, sort: &SortSpec) -> Self {
        let fields = ranges
            .ranges()
            .filter(|(_, r)| !r.is_universal() || r.special().is_some())
            .map(|(field, r)| (field.to_string(), PatternKind::classify(r)))
            .collect();
        Self {
            fields,
            sort: sort.normalized(),
        }
    }

    pub fn kind(&self, field: &str) -> Option<PatternKind> {
        self.fields.get(field).copied()
    }

    pub fn sort(&self) -> &SortSpec {
        &self.sort
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }
}

impl fmt::Display for QueryPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query: {{")?;
        for (i, (field, kind)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:?}", field, kind)?;
        }
        write!(f, "}} sort: {}", self.sort)
    }
}
