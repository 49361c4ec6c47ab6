//! Document matcher.
//!
//! The matcher is the correctness gate: every document a cursor produces is
//! checked here, whatever plan produced it.

use std::sync::Arc;

use serde_json::Value;

use super::ast::{as_point, distance, Condition, Predicate};
use crate::storage::key::{compare_values, type_rank, values_equal};
use crate::storage::path::values_at;

/// Decides whether a document satisfies a predicate.
pub trait Matcher: Send + Sync {
    fn matches(&self, doc: &Value) -> bool;
}

/// Matcher evaluating a parsed [`Predicate`] tree.
#[derive(Debug, Clone)]
pub struct DocumentMatcher {
    predicate: Arc<Predicate>,
}

impl DocumentMatcher {
    pub fn new(predicate: Arc<Predicate>) -> Self {
        Self { predicate }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

impl Matcher for DocumentMatcher {
    fn matches(&self, doc: &Value) -> bool {
        eval(&self.predicate, doc)
    }
}

fn eval(predicate: &Predicate, doc: &Value) -> bool {
    match predicate {
        Predicate::And(children) => children.iter().all(|c| eval(c, doc)),
        Predicate::Or(children) => children.iter().any(|c| eval(c, doc)),
        Predicate::Nor(children) => !children.iter().any(|c| eval(c, doc)),
        Predicate::Field { path, condition } => {
            let leaves = values_at(doc, path);
            condition_matches(&leaves, condition)
        }
    }
}

fn condition_matches(leaves: &[&Value], condition: &Condition) -> bool {
    match condition {
        Condition::Eq(v) => equality_matches(leaves, v),
        Condition::Ne(v) => !equality_matches(leaves, v),
        Condition::Gt(v) => any_element(leaves, |x| same_type_cmp(x, v).is_some_and(|o| o.is_gt())),
        Condition::Gte(v) => any_element(leaves, |x| same_type_cmp(x, v).is_some_and(|o| o.is_ge())),
        Condition::Lt(v) => any_element(leaves, |x| same_type_cmp(x, v).is_some_and(|o| o.is_lt())),
        Condition::Lte(v) => any_element(leaves, |x| same_type_cmp(x, v).is_some_and(|o| o.is_le())),
        Condition::In(values) => values.iter().any(|v| equality_matches(leaves, v)),
        Condition::Nin(values) => !values.iter().any(|v| equality_matches(leaves, v)),
        Condition::Exists(exists) => leaves.is_empty() != *exists,
        Condition::Regex(re) => any_element(leaves, |x| x.as_str().is_some_and(|s| re.is_match(s))),
        Condition::Not(inner) => !inner.iter().all(|c| condition_matches(leaves, c)),
        Condition::Near {
            point,
            max_distance,
        } => leaves.iter().any(|leaf| {
            as_point(leaf).is_some_and(|p| max_distance.map_or(true, |max| distance(*point, p) <= max))
        }),
        Condition::Within(shape) => leaves
            .iter()
            .any(|leaf| as_point(leaf).is_some_and(|p| shape.contains(p))),
    }
}

/// Whether `condition` holds for a document that lacks the field entirely.
pub(crate) fn condition_matches_missing(condition: &Condition) -> bool {
    condition_matches(&[], condition)
}

/// Equality also matches array elements, and `null` matches a missing field.
fn equality_matches(leaves: &[&Value], expected: &Value) -> bool {
    if expected.is_null() && leaves.is_empty() {
        return true;
    }
    any_element(leaves, |x| values_equal(x, expected))
}

/// Test each leaf, and each element of array leaves.
fn any_element(leaves: &[&Value], test: impl Fn(&Value) -> bool) -> bool {
    leaves.iter().any(|leaf| {
        test(leaf)
            || leaf
                .as_array()
                .is_some_and(|items| items.iter().any(|item| test(item)))
    })
}

/// Range comparisons only hold between values of the same type.
fn same_type_cmp(value: &Value, operand: &Value) -> Option<std::cmp::Ordering> {
    (type_rank(value) == type_rank(operand)).then(|| compare_values(value, operand))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_predicate;
    use serde_json::json;

    fn matches(query: Value, doc: Value) -> bool {
        let pred = parse_predicate(&query).unwrap();
        DocumentMatcher::new(Arc::new(pred)).matches(&doc)
    }

    #[test]
    fn test_equality_and_arrays() {
        assert!(matches(json!({"a": 1}), json!({"a": 1.0})));
        assert!(matches(json!({"a": 2}), json!({"a": [1, 2, 3]})));
        assert!(matches(json!({"a": [1, 2]}), json!({"a": [1, 2]})));
        assert!(!matches(json!({"a": 1}), json!({"b": 1})));
        assert!(matches(json!({"a": null}), json!({"b": 1})));
        assert!(matches(json!({"a.b": 4}), json!({"a": [{"b": 3}, {"b": 4}]})));
    }

    #[test]
    fn test_range_operators_are_type_bracketed() {
        assert!(matches(json!({"a": {"$gt": 1}}), json!({"a": 2})));
        assert!(!matches(json!({"a": {"$gt": 1}}), json!({"a": "z"})));
        assert!(matches(json!({"a": {"$gte": 1, "$lt": 3}}), json!({"a": [0, 2]})));
        assert!(!matches(json!({"a": {"$lte": 0}}), json!({"a": null})));
    }

    #[test]
    fn test_set_and_existence_operators() {
        assert!(matches(json!({"a": {"$in": [2, 3]}}), json!({"a": 3})));
        assert!(!matches(json!({"a": {"$in": []}}), json!({"a": 3})));
        assert!(matches(json!({"a": {"$nin": [2, 3]}}), json!({"a": 4})));
        assert!(matches(json!({"a": {"$ne": 2}}), json!({"b": 4})));
        assert!(matches(json!({"a": {"$exists": false}}), json!({"b": 4})));
        assert!(!matches(json!({"a": {"$exists": true}}), json!({"b": 4})));
        assert!(matches(json!({"a": {"$not": {"$gt": 5}}}), json!({"a": 4})));
    }

    #[test]
    fn test_logical_operators() {
        let doc = json!({"a": 1, "b": 2});
        assert!(matches(json!({"$or": [{"a": 5}, {"b": 2}]}), doc.clone()));
        assert!(!matches(json!({"$nor": [{"a": 1}]}), doc.clone()));
        assert!(matches(json!({"$and": [{"a": 1}, {"b": 2}]}), doc));
    }

    #[test]
    fn test_regex_and_geo() {
        assert!(matches(json!({"a": {"$regex": "^ab"}}), json!({"a": "abc"})));
        assert!(!matches(json!({"a": {"$regex": "^ab"}}), json!({"a": 5})));
        assert!(matches(
            json!({"loc": {"$near": [0, 0], "$maxDistance": 2}}),
            json!({"loc": [1, 1]})
        ));
        assert!(!matches(
            json!({"loc": {"$near": [0, 0], "$maxDistance": 1}}),
            json!({"loc": [1, 1]})
        ));
        assert!(matches(
            json!({"loc": {"$within": {"$box": [[0, 0], [2, 2]]}}}),
            json!({"loc": [1, 1]})
        ));
    }
}
