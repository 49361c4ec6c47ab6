//! Per-field ranges for a whole predicate.

use std::collections::BTreeMap;
use std::fmt;

use super::range::FieldRange;
use crate::catalog::KeyPattern;
use crate::query::Predicate;

/// Field ranges implied by the conjunctive part of a predicate.
///
/// In single-key mode every condition on a field is intersected into one
/// range. In multikey mode a field keeps the first constraining condition
/// only: with array values each condition may be satisfied by a different
/// element, so intersecting could drop matching documents.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRangeSet {
    ranges: BTreeMap<String, FieldRange>,
    single_key: bool,
    universal: FieldRange,
}

impl FieldRangeSet {
    pub fn new(predicate: &Predicate, single_key: bool) -> Self {
        let mut ranges: BTreeMap<String, FieldRange> = BTreeMap::new();
        for (path, condition) in predicate.conjunctive_conditions() {
            let range = FieldRange::from_condition(condition);
            match ranges.get_mut(path) {
                None => {
                    ranges.insert(path.to_string(), range);
                }
                Some(existing) if single_key => *existing = existing.intersect(&range),
                Some(existing) => {
                    if existing.is_universal() && !range.is_universal() {
                        *existing = range.intersect(existing);
                    }
                }
            }
        }
        Self {
            ranges,
            single_key,
            universal: FieldRange::universal(),
        }
    }

    pub fn is_single_key(&self) -> bool {
        self.single_key
    }

    /// Range for a field; universal when the predicate does not constrain it.
    pub fn range(&self, field: &str) -> &FieldRange {
        self.ranges.get(field).unwrap_or(&self.universal)
    }

    /// Constrained fields in path order.
    pub fn ranges(&self) -> impl Iterator<Item = (&str, &FieldRange)> {
        self.ranges.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn num_non_universal_ranges(&self) -> usize {
        self.ranges.values().filter(|r| !r.is_universal()).count()
    }

    /// False when some field admits no value at all.
    pub fn match_possible(&self) -> bool {
        self.ranges.values().all(|r| !r.is_empty())
    }

    /// False when some field of the key pattern admits no value.
    pub fn match_possible_for_index(&self, key_pattern: &KeyPattern) -> bool {
        key_pattern
            .fields()
            .iter()
            .all(|f| !self.range(&f.path).is_empty())
    }

    /// Special index kind named by some range, if any.
    pub fn special(&self) -> Option<&str> {
        self.ranges.values().find_map(FieldRange::special)
    }
}

impl fmt::Display for FieldRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (field, range)) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field, range)?;
        }
        write!(f, "}}")
    }
}

/// Single-key and multikey range sets for one predicate.
///
/// A plan on a multikey index must use the multikey set; every other plan
/// may use the tighter single-key set.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRangeSetPair {
    single_key: FieldRangeSet,
    multi_key: FieldRangeSet,
}

impl FieldRangeSetPair {
    pub fn new(predicate: &Predicate) -> Self {
        Self {
            single_key: FieldRangeSet::new(predicate, true),
            multi_key: FieldRangeSet::new(predicate, false),
        }
    }

    pub fn single_key(&self) -> &FieldRangeSet {
        &self.single_key
    }

    pub fn multi_key(&self) -> &FieldRangeSet {
        &self.multi_key
    }

    /// Range set valid for an index with the given multikey state.
    pub fn for_index(&self, multikey: bool) -> &FieldRangeSet {
        if multikey {
            &self.multi_key
        } else {
            &self.single_key
        }
    }

    /// Whether any document at all could match. Uses the multikey set, which
    /// never over-constrains.
    pub fn match_possible(&self) -> bool {
        self.multi_key.match_possible()
    }

    pub fn special(&self) -> Option<&str> {
        self.single_key.special()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_predicate;
    use serde_json::json;

    fn pair(query: serde_json::Value) -> FieldRangeSetPair {
        FieldRangeSetPair::new(&parse_predicate(&query).unwrap())
    }

    #[test]
    fn test_single_key_intersects() {
        let p = pair(json!({"a": {"$gt": 1, "$lt": 5}, "b": 2}));
        let frs = p.single_key();
        assert_eq!(frs.num_non_universal_ranges(), 2);
        assert!(frs.range("b").is_equality());
        assert!(frs.range("a").contains(&json!(3).into()));
        assert!(!frs.range("a").contains(&json!(7).into()));
        assert!(frs.range("z").is_universal());
    }

    #[test]
    fn test_multi_key_keeps_first_constraint() {
        let p = pair(json!({"a": {"$gt": 5, "$lt": 3}}));
        assert!(!p.single_key().match_possible());
        assert!(p.multi_key().match_possible());
        assert!(p.multi_key().range("a").contains(&json!(6).into()));
        assert!(p.match_possible());
    }

    #[test]
    fn test_empty_in_is_impossible_everywhere() {
        let p = pair(json!({"a": {"$in": []}}));
        assert!(!p.match_possible());
        assert!(!p.single_key().match_possible());
    }

    #[test]
    fn test_or_does_not_constrain() {
        let p = pair(json!({"$or": [{"a": 1}, {"a": 2}]}));
        assert_eq!(p.single_key().num_non_universal_ranges(), 0);
    }

    #[test]
    fn test_special_detection() {
        let p = pair(json!({"loc": {"$near": [0, 0]}, "a": 1}));
        assert_eq!(p.special(), Some("2d"));
        assert_eq!(pair(json!({"a": 1})).special(), None);
    }
}
