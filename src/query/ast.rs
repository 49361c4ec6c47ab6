//! Predicate tree produced by the query parser.

use std::fmt;

use regex::Regex;
use serde_json::Value;

use super::matcher::condition_matches_missing;

/// A parsed query predicate.
///
/// The parser always produces an `And` at the root; an empty query is
/// `And(vec![])` and matches everything.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Nor(Vec<Predicate>),
    Field { path: String, condition: Condition },
}

/// A condition on a single field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(RegexPattern),
    /// Negation of the conjunction of the inner conditions.
    Not(Vec<Condition>),
    /// Points ordered by distance from `point`.
    Near {
        point: [f64; 2],
        max_distance: Option<f64>,
    },
    /// Points inside a shape.
    Within(GeoShape),
}

/// Shapes accepted by `$within`.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoShape {
    Box { lower: [f64; 2], upper: [f64; 2] },
    Center { center: [f64; 2], radius: f64 },
}

impl GeoShape {
    pub fn contains(&self, point: [f64; 2]) -> bool {
        match self {
            GeoShape::Box { lower, upper } => {
                point[0] >= lower[0]
                    && point[0] <= upper[0]
                    && point[1] >= lower[1]
                    && point[1] <= upper[1]
            }
            GeoShape::Center { center, radius } => distance(*center, point) <= *radius,
        }
    }
}

/// Euclidean distance on the flat plane.
pub fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

/// Read a `[x, y]` pair of numbers.
pub fn as_point(value: &Value) -> Option<[f64; 2]> {
    let items = value.as_array()?;
    if items.len() != 2 {
        return None;
    }
    Some([items[0].as_f64()?, items[1].as_f64()?])
}

/// A compiled regular expression with its source.
#[derive(Debug, Clone)]
pub struct RegexPattern {
    pub pattern: String,
    pub options: String,
    compiled: Regex,
}

impl RegexPattern {
    pub fn new(pattern: impl Into<String>, options: impl Into<String>) -> Result<Self, regex::Error> {
        let pattern = pattern.into();
        let options = options.into();
        let flags: String = options
            .chars()
            .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x'))
            .collect();
        let source = if flags.is_empty() {
            pattern.clone()
        } else {
            format!("(?{}){}", flags, pattern)
        };
        let compiled = Regex::new(&source)?;
        Ok(Self {
            pattern,
            options,
            compiled,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.compiled.is_match(text)
    }

    /// The literal prefix every match must start with, when the pattern is
    /// anchored at the start and case sensitive.
    ///
    /// Returns the prefix and whether the pattern is nothing but that prefix.
    pub fn literal_prefix(&self) -> Option<(String, bool)> {
        if self.options.contains('i') || self.options.contains('m') || self.options.contains('x') {
            return None;
        }
        let body = self.pattern.strip_prefix('^')?;

        let mut prefix = String::new();
        let mut chars = body.chars().peekable();
        while let Some(&c) = chars.peek() {
            if ".*+?()[]{}|\\^$".contains(c) {
                break;
            }
            prefix.push(c);
            chars.next();
        }

        // a trailing quantifier makes the last literal optional
        if let Some(&next) = chars.peek() {
            if matches!(next, '?' | '*' | '{') {
                prefix.pop();
            }
        }
        let pure = chars.peek().is_none();
        Some((prefix, pure))
    }
}

impl PartialEq for RegexPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.options == other.options
    }
}

impl fmt::Display for RegexPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.pattern, self.options)
    }
}

impl Condition {
    /// Name of the special index kind this condition needs, if any.
    pub fn special_kind(&self) -> Option<&'static str> {
        match self {
            Condition::Near { .. } | Condition::Within(_) => Some("2d"),
            _ => None,
        }
    }
}

impl Predicate {
    /// A predicate that matches every document.
    pub fn all() -> Self {
        Predicate::And(Vec::new())
    }

    pub fn field(path: impl Into<String>, condition: Condition) -> Self {
        Predicate::Field {
            path: path.into(),
            condition,
        }
    }

    /// True for the empty conjunction.
    pub fn is_empty(&self) -> bool {
        matches!(self, Predicate::And(children) if children.is_empty())
    }

    /// Field conditions that apply to every match: the predicate itself when
    /// it is a field condition, and the conditions of nested conjunctions.
    pub fn conjunctive_conditions(&self) -> Vec<(&str, &Condition)> {
        let mut out = Vec::new();
        self.collect_conjunctive(&mut out);
        out
    }

    fn collect_conjunctive<'a>(&'a self, out: &mut Vec<(&'a str, &'a Condition)>) {
        match self {
            Predicate::And(children) => {
                for child in children {
                    child.collect_conjunctive(out);
                }
            }
            Predicate::Field { path, condition } => out.push((path.as_str(), condition)),
            Predicate::Or(_) | Predicate::Nor(_) => {}
        }
    }

    /// Conditions on one path that every match must satisfy.
    pub fn conditions_on(&self, path: &str) -> Vec<&Condition> {
        self.conjunctive_conditions()
            .into_iter()
            .filter(|(p, _)| *p == path)
            .map(|(_, c)| c)
            .collect()
    }

    /// The first special operator in the conjunctive part: (path, kind).
    pub fn special_operator(&self) -> Option<(&str, &'static str)> {
        self.conjunctive_conditions()
            .into_iter()
            .find_map(|(path, cond)| cond.special_kind().map(|kind| (path, kind)))
    }

    /// The top level disjunction, with the conjunctive context around it.
    ///
    /// Only the first `$or` directly under the root conjunction is split.
    pub fn top_level_or(&self) -> Option<(&[Predicate], Vec<&Predicate>)> {
        match self {
            Predicate::Or(branches) => Some((branches.as_slice(), Vec::new())),
            Predicate::And(children) => {
                let pos = children.iter().position(|c| matches!(c, Predicate::Or(_)))?;
                let Predicate::Or(branches) = &children[pos] else {
                    return None;
                };
                let context = children
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != pos)
                    .map(|(_, c)| c)
                    .collect();
                Some((branches.as_slice(), context))
            }
            Predicate::Field { .. } | Predicate::Nor(_) => None,
        }
    }

    /// True when the predicate is a flat conjunction of equalities with
    /// plain scalar operands.
    pub fn is_simple_equality(&self) -> bool {
        match self {
            Predicate::And(children) => children.iter().all(|c| c.is_simple_equality()),
            Predicate::Field {
                condition: Condition::Eq(v),
                ..
            } => !v.is_object() && !v.is_array(),
            _ => false,
        }
    }

    /// True when the predicate may match a document that lacks some field.
    ///
    /// A direct condition qualifies when it holds for a missing field, as
    /// `{a: null}`, `{a: {$ne: 1}}` or `{a: {$exists: false}}` do. Under
    /// `$nor` any `$exists` qualifies, whatever its polarity.
    pub fn may_match_missing_field(&self) -> bool {
        self.missing_field_match(false)
    }

    fn missing_field_match(&self, negated: bool) -> bool {
        match self {
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().any(|c| c.missing_field_match(negated))
            }
            Predicate::Nor(children) => children.iter().any(|c| c.missing_field_match(true)),
            Predicate::Field { condition, .. } if negated => mentions_exists(condition),
            Predicate::Field { condition, .. } => condition_matches_missing(condition),
        }
    }

    /// True when every match must have `path` present: some top level
    /// condition on it fails for a missing field.
    pub fn requires_field(&self, path: &str) -> bool {
        self.conditions_on(path)
            .into_iter()
            .any(|c| !condition_matches_missing(c))
    }
}

fn mentions_exists(condition: &Condition) -> bool {
    match condition {
        Condition::Exists(_) => true,
        Condition::Not(inner) => inner.iter().any(mentions_exists),
        _ => false,
    }
}
