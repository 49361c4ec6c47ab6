//! canonical value ordering and index key values.
//!
//! Documents are plain JSON values. Index keys and range bounds need a total
//! order across all of them, plus two sentinels that sort before and after
//! every value.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

/// Rank of a value's type in the canonical cross-type order.
///
/// null < numbers < strings < objects < arrays < booleans
pub fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Object(_) => 4,
        Value::Array(_) => 5,
        Value::Bool(_) => 6,
    }
}

/// Total order over JSON values.
///
/// Numbers compare numerically whatever their representation, so `4` and
/// `4.0` are equal.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let by_type = type_rank(a).cmp(&type_rank(b));
    if by_type != Ordering::Equal {
        return by_type;
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = type_rank(lv)
                    .cmp(&type_rank(rv))
                    .then_with(|| lk.cmp(rk))
                    .then_with(|| compare_values(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

fn compare_numbers(x: &serde_json::Number, y: &serde_json::Number) -> Ordering {
    if let (Some(l), Some(r)) = (x.as_i64(), y.as_i64()) {
        return l.cmp(&r);
    }
    if let (Some(l), Some(r)) = (x.as_u64(), y.as_u64()) {
        return l.cmp(&r);
    }
    let l = x.as_f64().unwrap_or(f64::NAN);
    let r = y.as_f64().unwrap_or(f64::NAN);
    // NaN sorts before every other number
    match (l.is_nan(), r.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
    }
}

/// Equality under the canonical order.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

/// One component of an index key or range bound.
#[derive(Debug, Clone)]
pub enum KeyValue {
    MinKey,
    Value(Value),
    MaxKey,
}

impl KeyValue {
    pub fn is_min(&self) -> bool {
        matches!(self, KeyValue::MinKey)
    }

    pub fn is_max(&self) -> bool {
        matches!(self, KeyValue::MaxKey)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            KeyValue::Value(v) => Some(v),
            _ => None,
        }
    }

    /// the opposite sentinel; plain values are returned unchanged
    pub fn flipped(&self) -> KeyValue {
        match self {
            KeyValue::MinKey => KeyValue::MaxKey,
            KeyValue::MaxKey => KeyValue::MinKey,
            KeyValue::Value(v) => KeyValue::Value(v.clone()),
        }
    }
}

impl From<Value> for KeyValue {
    fn from(value: Value) -> Self {
        KeyValue::Value(value)
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::MinKey, KeyValue::MinKey) | (KeyValue::MaxKey, KeyValue::MaxKey) => {
                Ordering::Equal
            }
            (KeyValue::MinKey, _) | (_, KeyValue::MaxKey) => Ordering::Less,
            (_, KeyValue::MinKey) | (KeyValue::MaxKey, _) => Ordering::Greater,
            (KeyValue::Value(a), KeyValue::Value(b)) => compare_values(a, b),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::MinKey => write!(f, "MinKey"),
            KeyValue::MaxKey => write!(f, "MaxKey"),
            KeyValue::Value(v) => write!(f, "{}", v),
        }
    }
}

/// A compound index key, one component per key pattern field.
pub type IndexKey = Vec<KeyValue>;

/// Compare two compound keys in index order.
///
/// `directions[i]` is the sign of key field `i`; a negative sign reverses that
/// component. Missing directions count as ascending.
pub fn compare_keys(a: &[KeyValue], b: &[KeyValue], directions: &[i32]) -> Ordering {
    for (i, (l, r)) in a.iter().zip(b.iter()).enumerate() {
        let mut ord = l.cmp(r);
        if directions.get(i).copied().unwrap_or(1) < 0 {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Render a compound key as `[a, b]`.
pub fn format_key(key: &[KeyValue]) -> String {
    let parts: Vec<String> = key.iter().map(|k| k.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cross_type_order() {
        let ordered = vec![
            json!(null),
            json!(-3),
            json!(2.5),
            json!(10),
            json!(""),
            json!("abc"),
            json!({"a": 1}),
            json!([1, 2]),
            json!(false),
            json!(true),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(
                compare_values(&pair[0], &pair[1]),
                Ordering::Less,
                "{} < {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert!(values_equal(&json!(4), &json!(4.0)));
        assert_eq!(compare_values(&json!(-1), &json!(0.5)), Ordering::Less);
        assert_eq!(
            compare_values(&json!(u64::MAX), &json!(1)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_sentinels_bracket_values() {
        let min = KeyValue::MinKey;
        let max = KeyValue::MaxKey;
        let v = KeyValue::Value(json!(true));
        assert!(min < v);
        assert!(v < max);
        assert_eq!(min.flipped(), max);
    }

    #[test]
    fn test_compare_keys_with_directions() {
        let a = vec![KeyValue::from(json!(1)), KeyValue::from(json!(5))];
        let b = vec![KeyValue::from(json!(1)), KeyValue::from(json!(7))];
        assert_eq!(compare_keys(&a, &b, &[1, 1]), Ordering::Less);
        assert_eq!(compare_keys(&a, &b, &[1, -1]), Ordering::Greater);
        assert_eq!(format_key(&a), "[1, 5]");
    }
}
