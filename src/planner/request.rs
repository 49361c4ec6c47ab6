//! Query requests as seen by the planner.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::error::{PlanError, PlanResult};
use crate::catalog::KeyPattern;
use crate::query::{parse_predicate, Predicate, Projection, QueryResult, SortSpec};

/// A user supplied index choice.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    /// Index by name, e.g. `"a_1"`.
    Name(String),
    /// Index by key pattern, e.g. `{a: 1}`.
    KeyPattern(KeyPattern),
    /// Collection scan, `{$natural: 1}` or `{$natural: -1}`.
    Natural(i32),
}

impl Hint {
    pub fn parse(value: &Value) -> PlanResult<Self> {
        match value {
            Value::String(name) => Ok(Hint::Name(name.clone())),
            Value::Object(map) => {
                if let Some(direction) = map.get("$natural") {
                    if map.len() != 1 {
                        return Err(PlanError::BadHint(
                            "$natural cannot be combined with other fields".to_string(),
                        ));
                    }
                    let direction = match direction.as_f64() {
                        Some(d) if d < 0.0 => -1,
                        Some(_) => 1,
                        None => {
                            return Err(PlanError::BadHint(format!(
                                "bad $natural direction: {}",
                                direction
                            )))
                        }
                    };
                    return Ok(Hint::Natural(direction));
                }
                KeyPattern::from_json(value)
                    .map(Hint::KeyPattern)
                    .map_err(|e| PlanError::BadHint(e.to_string()))
            }
            other => Err(PlanError::BadHint(format!(
                "expected a name or key pattern, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hint::Name(name) => write!(f, "{}", name),
            Hint::KeyPattern(key) => write!(f, "{}", key),
            Hint::Natural(direction) => write!(f, r#"{{"$natural":{}}}"#, direction),
        }
    }
}

/// How a plan set may use the plan cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    Use,
    /// Use a cached plan only if it needs no explicit sort.
    UseIfInOrder,
    Ignore,
}

/// Everything the planner needs to know about a query.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub predicate: Arc<Predicate>,
    pub sort: SortSpec,
    pub projection: Option<Projection>,
    pub hint: Option<Hint>,
    /// Inclusive lower key bound, e.g. `{a: 3}`.
    pub min: Option<Value>,
    /// Exclusive upper key bound.
    pub max: Option<Value>,
    pub allow_special: bool,
    pub cache_policy: CachePolicy,
    pub limit: Option<usize>,
}

impl QueryRequest {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate: Arc::new(predicate),
            sort: SortSpec::none(),
            projection: None,
            hint: None,
            min: None,
            max: None,
            allow_special: true,
            cache_policy: CachePolicy::Use,
            limit: None,
        }
    }

    /// Request for a JSON query document.
    pub fn parse(query: &Value) -> QueryResult<Self> {
        Ok(Self::new(parse_predicate(query)?))
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn hint(mut self, hint: Hint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn min(mut self, min: Value) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: Value) -> Self {
        self.max = Some(max);
        self
    }

    pub fn allow_special(mut self, value: bool) -> Self {
        self.allow_special = value;
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Same request over a different predicate.
    pub fn with_predicate(&self, predicate: Predicate) -> Self {
        Self {
            predicate: Arc::new(predicate),
            ..self.clone()
        }
    }

    pub fn has_min_max(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}
