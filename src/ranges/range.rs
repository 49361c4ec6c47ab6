//! Value ranges for a single field.

use std::cmp::Ordering;
use std::fmt;

use serde_json::{Map, Value};

use crate::query::{Condition, RegexPattern};
use crate::storage::key::KeyValue;

/// One end of an interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBound {
    pub value: KeyValue,
    pub inclusive: bool,
}

impl FieldBound {
    pub fn inclusive(value: KeyValue) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }

    pub fn exclusive(value: KeyValue) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }
}

impl fmt::Display for FieldBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// A contiguous interval of key values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInterval {
    pub lower: FieldBound,
    pub upper: FieldBound,
}

impl FieldInterval {
    /// Build an interval; `None` when it contains no value.
    pub fn new(lower: FieldBound, upper: FieldBound) -> Option<Self> {
        match lower.value.cmp(&upper.value) {
            Ordering::Less => Some(Self { lower, upper }),
            Ordering::Equal if lower.inclusive && upper.inclusive => Some(Self { lower, upper }),
            _ => None,
        }
    }

    pub fn point(value: Value) -> Self {
        let bound = FieldBound::inclusive(KeyValue::Value(value));
        Self {
            lower: bound.clone(),
            upper: bound,
        }
    }

    pub fn universal() -> Self {
        Self {
            lower: FieldBound::inclusive(KeyValue::MinKey),
            upper: FieldBound::inclusive(KeyValue::MaxKey),
        }
    }

    /// True when the interval holds exactly one value.
    pub fn is_point(&self) -> bool {
        self.lower.inclusive && self.upper.inclusive && self.lower.value == self.upper.value
    }

    pub fn contains(&self, value: &KeyValue) -> bool {
        let above = match value.cmp(&self.lower.value) {
            Ordering::Greater => true,
            Ordering::Equal => self.lower.inclusive,
            Ordering::Less => false,
        };
        let below = match value.cmp(&self.upper.value) {
            Ordering::Less => true,
            Ordering::Equal => self.upper.inclusive,
            Ordering::Greater => false,
        };
        above && below
    }

    fn intersect(&self, other: &FieldInterval) -> Option<FieldInterval> {
        let lower = max_lower(&self.lower, &other.lower).clone();
        let upper = min_upper(&self.upper, &other.upper).clone();
        FieldInterval::new(lower, upper)
    }
}

impl fmt::Display for FieldInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}, {}{}",
            if self.lower.inclusive { "[" } else { "(" },
            self.lower,
            self.upper,
            if self.upper.inclusive { "]" } else { ")" }
        )
    }
}

fn max_lower<'a>(a: &'a FieldBound, b: &'a FieldBound) -> &'a FieldBound {
    match a.value.cmp(&b.value) {
        Ordering::Greater => a,
        Ordering::Less => b,
        // an exclusive lower bound is the tighter one
        Ordering::Equal => {
            if a.inclusive {
                b
            } else {
                a
            }
        }
    }
}

fn min_upper<'a>(a: &'a FieldBound, b: &'a FieldBound) -> &'a FieldBound {
    match a.value.cmp(&b.value) {
        Ordering::Less => a,
        Ordering::Greater => b,
        Ordering::Equal => {
            if a.inclusive {
                b
            } else {
                a
            }
        }
    }
}

/// The set of values a field may take, as sorted disjoint intervals.
///
/// An empty interval list means no value can satisfy the predicate. A range
/// may also carry the name of a special index kind whose operator produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRange {
    intervals: Vec<FieldInterval>,
    special: Option<String>,
}

impl FieldRange {
    pub fn universal() -> Self {
        Self {
            intervals: vec![FieldInterval::universal()],
            special: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            intervals: Vec::new(),
            special: None,
        }
    }

    pub fn point(value: Value) -> Self {
        Self {
            intervals: vec![FieldInterval::point(value)],
            special: None,
        }
    }

    fn from_intervals(intervals: Vec<FieldInterval>) -> Self {
        let mut range = Self {
            intervals,
            special: None,
        };
        range.normalize();
        range
    }

    /// Range of values satisfying one condition.
    pub fn from_condition(condition: &Condition) -> Self {
        use KeyValue::{MaxKey, MinKey};

        let span = |lower: FieldBound, upper: FieldBound| {
            Self::from_intervals(FieldInterval::new(lower, upper).into_iter().collect())
        };

        match condition {
            Condition::Eq(v) => equality_range(v),
            Condition::Ne(v) => {
                let below = FieldInterval::new(
                    FieldBound::inclusive(MinKey),
                    FieldBound::exclusive(KeyValue::Value(v.clone())),
                );
                let above = FieldInterval::new(
                    FieldBound::exclusive(KeyValue::Value(v.clone())),
                    FieldBound::inclusive(MaxKey),
                );
                Self::from_intervals(below.into_iter().chain(above).collect())
            }
            Condition::Gt(v) => span(
                FieldBound::exclusive(KeyValue::Value(v.clone())),
                FieldBound::inclusive(MaxKey),
            ),
            Condition::Gte(v) => span(
                FieldBound::inclusive(KeyValue::Value(v.clone())),
                FieldBound::inclusive(MaxKey),
            ),
            Condition::Lt(v) => span(
                FieldBound::inclusive(MinKey),
                FieldBound::exclusive(KeyValue::Value(v.clone())),
            ),
            Condition::Lte(v) => span(
                FieldBound::inclusive(MinKey),
                FieldBound::inclusive(KeyValue::Value(v.clone())),
            ),
            Condition::In(values) => values
                .iter()
                .map(equality_range)
                .fold(Self::empty(), |acc, r| acc.union(&r)),
            Condition::Exists(false) => Self::point(Value::Null),
            Condition::Regex(re) => regex_range(re),
            Condition::Near { .. } | Condition::Within(_) => {
                let mut range = Self::universal();
                range.special = condition.special_kind().map(str::to_string);
                range
            }
            Condition::Nin(_) | Condition::Exists(true) | Condition::Not(_) => Self::universal(),
        }
    }

    pub fn intervals(&self) -> &[FieldInterval] {
        &self.intervals
    }

    pub fn special(&self) -> Option<&str> {
        self.special.as_deref()
    }

    /// True when every value is admitted.
    pub fn is_universal(&self) -> bool {
        self.intervals.len() == 1
            && self.intervals[0].lower.value.is_min()
            && self.intervals[0].lower.inclusive
            && self.intervals[0].upper.value.is_max()
            && self.intervals[0].upper.inclusive
    }

    /// True when no value is admitted.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// True when exactly one value is admitted.
    pub fn is_equality(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].is_point()
    }

    /// True when the range is a non-empty finite set of points.
    pub fn is_point_set(&self) -> bool {
        !self.intervals.is_empty() && self.intervals.iter().all(FieldInterval::is_point)
    }

    pub fn contains(&self, value: &KeyValue) -> bool {
        self.intervals.iter().any(|i| i.contains(value))
    }

    /// Lowest bound value.
    pub fn min(&self) -> Option<&KeyValue> {
        self.intervals.first().map(|i| &i.lower.value)
    }

    /// Highest bound value.
    pub fn max(&self) -> Option<&KeyValue> {
        self.intervals.last().map(|i| &i.upper.value)
    }

    pub fn intersect(&self, other: &FieldRange) -> FieldRange {
        let mut intervals = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.intervals.len() && j < other.intervals.len() {
            let (a, b) = (&self.intervals[i], &other.intervals[j]);
            if let Some(overlap) = a.intersect(b) {
                intervals.push(overlap);
            }
            // advance whichever interval ends first
            let a_first = match a.upper.value.cmp(&b.upper.value) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => !a.upper.inclusive,
            };
            if a_first {
                i += 1;
            } else {
                j += 1;
            }
        }
        let mut range = FieldRange::from_intervals(intervals);
        range.special = self.special.clone().or_else(|| other.special.clone());
        range
    }

    pub fn union(&self, other: &FieldRange) -> FieldRange {
        let intervals = self
            .intervals
            .iter()
            .chain(other.intervals.iter())
            .cloned()
            .collect();
        let mut range = FieldRange::from_intervals(intervals);
        range.special = self.special.clone().or_else(|| other.special.clone());
        range
    }

    /// Sort intervals and merge the ones that overlap or touch.
    fn normalize(&mut self) {
        self.intervals.sort_by(|a, b| {
            a.lower
                .value
                .cmp(&b.lower.value)
                .then_with(|| b.lower.inclusive.cmp(&a.lower.inclusive))
        });
        let mut merged: Vec<FieldInterval> = Vec::with_capacity(self.intervals.len());
        for interval in self.intervals.drain(..) {
            if let Some(last) = merged.last_mut() {
                let touches = match interval.lower.value.cmp(&last.upper.value) {
                    Ordering::Less => true,
                    Ordering::Equal => interval.lower.inclusive || last.upper.inclusive,
                    Ordering::Greater => false,
                };
                if touches {
                    match interval.upper.value.cmp(&last.upper.value) {
                        Ordering::Greater => last.upper = interval.upper,
                        Ordering::Equal => last.upper.inclusive |= interval.upper.inclusive,
                        Ordering::Less => {}
                    }
                    continue;
                }
            }
            merged.push(interval);
        }
        self.intervals = merged;
    }
}

impl fmt::Display for FieldRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.intervals.iter().map(|i| i.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Equality on an array also admits its first element, since array fields
/// are indexed element by element.
fn equality_range(value: &Value) -> FieldRange {
    let mut range = FieldRange::point(value.clone());
    if let Some(first) = value.as_array().and_then(|items| items.first()) {
        range = range.union(&FieldRange::point(first.clone()));
    }
    range
}

fn regex_range(re: &RegexPattern) -> FieldRange {
    let all_strings = || {
        FieldRange::from_intervals(
            FieldInterval::new(
                FieldBound::inclusive(KeyValue::Value(Value::String(String::new()))),
                FieldBound::exclusive(KeyValue::Value(Value::Object(Map::new()))),
            )
            .into_iter()
            .collect(),
        )
    };

    let Some((prefix, _)) = re.literal_prefix() else {
        return all_strings();
    };
    if prefix.is_empty() {
        return all_strings();
    }
    let upper = match string_successor(&prefix) {
        Some(next) => KeyValue::Value(Value::String(next)),
        None => KeyValue::Value(Value::Object(Map::new())),
    };
    FieldRange::from_intervals(
        FieldInterval::new(
            FieldBound::inclusive(KeyValue::Value(Value::String(prefix))),
            FieldBound::exclusive(upper),
        )
        .into_iter()
        .collect(),
    )
}

/// Smallest string greater than every string starting with `prefix`.
fn string_successor(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        let mut code = last as u32 + 1;
        // skip the surrogate gap
        if (0xD800..=0xDFFF).contains(&code) {
            code = 0xE000;
        }
        if let Some(next) = char::from_u32(code) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn range(condition: Condition) -> FieldRange {
        FieldRange::from_condition(&condition)
    }

    #[test]
    fn test_equality_and_universal() {
        assert!(range(Condition::Eq(json!(4))).is_equality());
        assert!(range(Condition::Exists(true)).is_universal());
        assert!(range(Condition::Exists(false)).is_equality());
        assert!(!FieldRange::universal().is_equality());
    }

    #[test]
    fn test_intersection() {
        let gt = range(Condition::Gt(json!(1)));
        let lt = range(Condition::Lt(json!(5)));
        let both = gt.intersect(&lt);
        assert_eq!(both.intervals().len(), 1);
        assert!(both.contains(&KeyValue::from(json!(3))));
        assert!(!both.contains(&KeyValue::from(json!(1))));
        assert!(!both.contains(&KeyValue::from(json!(5))));

        let impossible = range(Condition::Gt(json!(10))).intersect(&range(Condition::Lt(json!(10))));
        assert!(impossible.is_empty());

        let point = range(Condition::Gte(json!(3))).intersect(&range(Condition::Lte(json!(3))));
        assert!(point.is_equality());
    }

    #[test]
    fn test_in_builds_sorted_points() {
        let r = range(Condition::In(vec![json!(9), json!(2), json!(3), json!(2)]));
        assert_eq!(r.intervals().len(), 3);
        assert!(r.is_point_set());
        assert_eq!(r.min(), Some(&KeyValue::from(json!(2))));
        assert_eq!(r.max(), Some(&KeyValue::from(json!(9))));
        assert!(range(Condition::In(vec![])).is_empty());
    }

    #[test]
    fn test_ne_splits_range() {
        let r = range(Condition::Ne(json!(4)));
        assert_eq!(r.intervals().len(), 2);
        assert!(!r.contains(&KeyValue::from(json!(4))));
        assert!(r.contains(&KeyValue::from(json!(null))));
        assert!(!r.is_universal());
    }

    #[test]
    fn test_union_merges_overlaps() {
        let a = range(Condition::Lte(json!(5)));
        let b = range(Condition::Gt(json!(5)));
        assert!(a.union(&b).is_universal());

        let c = range(Condition::Lt(json!(2)));
        let d = range(Condition::Gt(json!(2)));
        assert_eq!(c.union(&d).intervals().len(), 2);
    }

    #[test]
    fn test_regex_prefix_range() {
        let re = RegexPattern::new("^ab", "").unwrap();
        let r = range(Condition::Regex(re));
        assert!(r.contains(&KeyValue::from(json!("abz"))));
        assert!(!r.contains(&KeyValue::from(json!("ac"))));

        let unanchored = RegexPattern::new("b", "").unwrap();
        let r = range(Condition::Regex(unanchored));
        assert!(r.contains(&KeyValue::from(json!("zzz"))));
        assert!(!r.contains(&KeyValue::from(json!(5))));
    }

    #[test]
    fn test_array_equality_admits_first_element() {
        let r = range(Condition::Eq(json!([0, 0])));
        assert!(r.contains(&KeyValue::from(json!(0))));
        assert!(r.contains(&KeyValue::from(json!([0, 0]))));
    }

    #[test]
    fn test_special_operator_marks_range() {
        let r = range(Condition::Near {
            point: [0.0, 0.0],
            max_distance: None,
        });
        assert!(r.is_universal());
        assert_eq!(r.special(), Some("2d"));
    }
}
