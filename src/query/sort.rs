//! Sort specifications.

use std::cmp::Ordering;
use std::fmt;

use serde_json::{Map, Value};

use super::error::{QueryError, QueryResult};
use crate::storage::key::compare_values;
use crate::storage::path::values_at;

/// One sort field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortField {
    pub path: String,
    /// +1 ascending, -1 descending
    pub direction: i32,
}

/// A parsed sort spec such as `{a: 1, b: -1}` or `{$natural: -1}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SortSpec {
    fields: Vec<SortField>,
    natural: Option<i32>,
}

impl SortSpec {
    /// No ordering requested.
    pub fn none() -> Self {
        Self::default()
    }

    /// Collection order, forward for positive `direction`.
    pub fn natural(direction: i32) -> Self {
        Self {
            fields: Vec::new(),
            natural: Some(if direction < 0 { -1 } else { 1 }),
        }
    }

    pub fn parse(value: &Value) -> QueryResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| QueryError::InvalidSort(format!("expected an object, got {}", value)))?;
        let mut spec = Self::default();
        for (path, dir) in map {
            let direction = sort_direction(dir)
                .ok_or_else(|| QueryError::InvalidSort(format!("bad direction for {}: {}", path, dir)))?;
            if path == "$natural" {
                spec.natural = Some(direction);
            } else {
                spec.fields.push(SortField {
                    path: path.clone(),
                    direction,
                });
            }
        }
        if spec.natural.is_some() && !spec.fields.is_empty() {
            return Err(QueryError::InvalidSort(
                "$natural cannot be combined with other fields".to_string(),
            ));
        }
        Ok(spec)
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// True when no order at all is requested.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.natural.is_none()
    }

    /// Direction of a `$natural` sort, if that is what was requested.
    pub fn natural_direction(&self) -> Option<i32> {
        self.natural
    }

    pub fn contains_field(&self, path: &str) -> bool {
        self.fields.iter().any(|f| f.path == path)
    }

    /// Same fields with the first direction made ascending.
    pub fn normalized(&self) -> SortSpec {
        let flip = self.fields.first().is_some_and(|f| f.direction < 0);
        SortSpec {
            fields: self
                .fields
                .iter()
                .map(|f| SortField {
                    path: f.path.clone(),
                    direction: if flip { -f.direction } else { f.direction },
                })
                .collect(),
            natural: self.natural.map(|_| 1),
        }
    }

    /// Compare two documents under this sort.
    ///
    /// Missing fields sort as null. For array values the smallest element is
    /// used ascending and the largest descending.
    pub fn compare_documents(&self, a: &Value, b: &Value) -> Ordering {
        for field in &self.fields {
            let left = sort_key(a, &field.path, field.direction);
            let right = sort_key(b, &field.path, field.direction);
            let mut ord = compare_values(&left, &right);
            if field.direction < 0 {
                ord = ord.reverse();
            }
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        if let Some(dir) = self.natural {
            map.insert("$natural".to_string(), Value::from(dir));
        }
        for f in &self.fields {
            map.insert(f.path.clone(), Value::from(f.direction));
        }
        Value::Object(map)
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

fn sort_direction(value: &Value) -> Option<i32> {
    let n = value.as_f64()?;
    if n < 0.0 {
        Some(-1)
    } else {
        Some(1)
    }
}

fn sort_key(doc: &Value, path: &str, direction: i32) -> Value {
    let mut candidates: Vec<&Value> = Vec::new();
    for leaf in values_at(doc, path) {
        match leaf {
            Value::Array(items) if !items.is_empty() => candidates.extend(items.iter()),
            other => candidates.push(other),
        }
    }
    let pick = if direction < 0 {
        candidates.into_iter().max_by(|l, r| compare_values(l, r))
    } else {
        candidates.into_iter().min_by(|l, r| compare_values(l, r))
    };
    pick.cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sort() {
        let sort = SortSpec::parse(&json!({"a": 1, "b": -1})).unwrap();
        assert_eq!(sort.fields().len(), 2);
        assert_eq!(sort.fields()[1].direction, -1);
        assert!(!sort.is_empty());
        assert_eq!(sort.to_string(), r#"{"a":1,"b":-1}"#);

        let natural = SortSpec::parse(&json!({"$natural": -1})).unwrap();
        assert_eq!(natural.natural_direction(), Some(-1));

        assert!(SortSpec::parse(&json!({"a": "up"})).is_err());
        assert!(SortSpec::parse(&json!({"$natural": 1, "a": 1})).is_err());
    }

    #[test]
    fn test_normalized_flips_leading_descending() {
        let sort = SortSpec::parse(&json!({"a": -1, "b": 1})).unwrap();
        let norm = sort.normalized();
        assert_eq!(norm.fields()[0].direction, 1);
        assert_eq!(norm.fields()[1].direction, -1);
        assert_eq!(norm, SortSpec::parse(&json!({"a": 1, "b": -1})).unwrap());
    }

    #[test]
    fn test_compare_documents() {
        let sort = SortSpec::parse(&json!({"a": 1, "b": -1})).unwrap();
        let x = json!({"a": 1, "b": 1});
        let y = json!({"a": 1, "b": 2});
        let z = json!({"b": 9});
        assert_eq!(sort.compare_documents(&x, &y), Ordering::Greater);
        assert_eq!(sort.compare_documents(&z, &x), Ordering::Less);

        let arrays = SortSpec::parse(&json!({"a": 1})).unwrap();
        assert_eq!(
            arrays.compare_documents(&json!({"a": [5, 0]}), &json!({"a": 1})),
            Ordering::Less
        );
    }
}
