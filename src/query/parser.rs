//! JSON query document parser.
//!
//! Turns `{a: 1, b: {$gt: 2, $lt: 5}, $or: [...]}` into a [`Predicate`] tree.
//! Field order is preserved, so the tree mirrors the query document.

use serde_json::{Map, Value};

use super::ast::{as_point, Condition, GeoShape, Predicate, RegexPattern};
use super::error::{QueryError, QueryResult};

/// Parse a query document.
pub fn parse_predicate(query: &Value) -> QueryResult<Predicate> {
    let map = as_object(query, "query")?;
    parse_object(map)
}

fn parse_object(map: &Map<String, Value>) -> QueryResult<Predicate> {
    let mut children = Vec::new();
    for (key, value) in map {
        match key.as_str() {
            "$and" => children.push(Predicate::And(parse_clauses(key, value)?)),
            "$or" => children.push(Predicate::Or(parse_clauses(key, value)?)),
            "$nor" => children.push(Predicate::Nor(parse_clauses(key, value)?)),
            op if op.starts_with('$') => return Err(QueryError::UnknownOperator(op.to_string())),
            path => children.extend(parse_field(path, value)?),
        }
    }
    Ok(Predicate::And(children))
}

fn parse_clauses(operator: &str, value: &Value) -> QueryResult<Vec<Predicate>> {
    let items = value
        .as_array()
        .ok_or_else(|| QueryError::operand(operator, "expected an array"))?;
    if items.is_empty() {
        return Err(QueryError::operand(operator, "expected a non-empty array"));
    }
    items
        .iter()
        .map(|item| parse_object(as_object(item, "clause")?))
        .collect()
}

fn parse_field(path: &str, value: &Value) -> QueryResult<Vec<Predicate>> {
    let conditions = match value {
        Value::Object(map) if is_operator_object(map) => parse_operators(map)?,
        other => vec![Condition::Eq(other.clone())],
    };
    Ok(conditions
        .into_iter()
        .map(|condition| Predicate::field(path, condition))
        .collect())
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    map.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn parse_operators(map: &Map<String, Value>) -> QueryResult<Vec<Condition>> {
    let mut conditions = Vec::new();
    for (op, arg) in map {
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(arg.clone()),
            "$ne" => Condition::Ne(arg.clone()),
            "$gt" => Condition::Gt(arg.clone()),
            "$gte" => Condition::Gte(arg.clone()),
            "$lt" => Condition::Lt(arg.clone()),
            "$lte" => Condition::Lte(arg.clone()),
            "$in" => Condition::In(array_operand(op, arg)?),
            "$nin" => Condition::Nin(array_operand(op, arg)?),
            "$exists" => Condition::Exists(truthy(arg)),
            "$regex" => {
                let options = map.get("$options").and_then(Value::as_str).unwrap_or("");
                regex_condition(arg, options)?
            }
            "$options" => {
                if map.contains_key("$regex") {
                    continue;
                }
                return Err(QueryError::operand(op, "$options requires $regex"));
            }
            "$not" => parse_not(arg)?,
            "$near" => {
                let point = as_point(arg)
                    .ok_or_else(|| QueryError::operand(op, "expected [x, y]"))?;
                let max_distance = match map.get("$maxDistance") {
                    Some(d) => Some(
                        d.as_f64()
                            .ok_or_else(|| QueryError::operand("$maxDistance", "expected a number"))?,
                    ),
                    None => None,
                };
                Condition::Near {
                    point,
                    max_distance,
                }
            }
            "$maxDistance" => {
                if map.contains_key("$near") {
                    continue;
                }
                return Err(QueryError::operand(op, "$maxDistance requires $near"));
            }
            "$within" => Condition::Within(parse_shape(arg)?),
            other => return Err(QueryError::UnknownOperator(other.to_string())),
        };
        conditions.push(condition);
    }
    Ok(conditions)
}

fn parse_not(arg: &Value) -> QueryResult<Condition> {
    match arg {
        Value::Object(map) if map.contains_key("$regex") => {
            let options = map.get("$options").and_then(Value::as_str).unwrap_or("");
            let pattern = map.get("$regex").unwrap_or(&Value::Null);
            Ok(Condition::Not(vec![regex_condition(pattern, options)?]))
        }
        Value::Object(map) if is_operator_object(map) => Ok(Condition::Not(parse_operators(map)?)),
        _ => Err(QueryError::operand("$not", "expected an operator object")),
    }
}

fn regex_condition(pattern: &Value, options: &str) -> QueryResult<Condition> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| QueryError::operand("$regex", "expected a string"))?;
    Ok(Condition::Regex(RegexPattern::new(pattern, options)?))
}

fn parse_shape(arg: &Value) -> QueryResult<GeoShape> {
    let map = as_object(arg, "$within")?;
    if let Some(corners) = map.get("$box") {
        let items = corners.as_array().filter(|c| c.len() == 2);
        let (lower, upper) = match items {
            Some(c) => (as_point(&c[0]), as_point(&c[1])),
            None => (None, None),
        };
        return match (lower, upper) {
            (Some(lower), Some(upper)) => Ok(GeoShape::Box { lower, upper }),
            _ => Err(QueryError::operand("$box", "expected [[x1, y1], [x2, y2]]")),
        };
    }
    if let Some(circle) = map.get("$center") {
        let items = circle.as_array().filter(|c| c.len() == 2);
        let parsed = items.and_then(|c| Some((as_point(&c[0])?, c[1].as_f64()?)));
        return match parsed {
            Some((center, radius)) => Ok(GeoShape::Center { center, radius }),
            None => Err(QueryError::operand("$center", "expected [[x, y], radius]")),
        };
    }
    Err(QueryError::operand("$within", "expected $box or $center"))
}

fn array_operand(operator: &str, arg: &Value) -> QueryResult<Vec<Value>> {
    arg.as_array()
        .cloned()
        .ok_or_else(|| QueryError::operand(operator, "expected an array"))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        _ => true,
    }
}

pub(crate) fn as_object<'a>(value: &'a Value, what: &'static str) -> QueryResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| QueryError::NotAnObject {
        what,
        found: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_implicit_equality() {
        let pred = parse_predicate(&json!({"a": 1, "b": {"c": 2}})).unwrap();
        assert_eq!(
            pred,
            Predicate::And(vec![
                Predicate::field("a", Condition::Eq(json!(1))),
                Predicate::field("b", Condition::Eq(json!({"c": 2}))),
            ])
        );
    }

    #[test]
    fn test_parse_operator_object() {
        let pred = parse_predicate(&json!({"a": {"$gt": 1, "$lt": 5}})).unwrap();
        assert_eq!(
            pred,
            Predicate::And(vec![
                Predicate::field("a", Condition::Gt(json!(1))),
                Predicate::field("a", Condition::Lt(json!(5))),
            ])
        );
    }

    #[test]
    fn test_parse_logical_operators() {
        let pred = parse_predicate(&json!({"$or": [{"a": 1}, {"b": 2}], "c": 3})).unwrap();
        let Predicate::And(children) = pred else {
            panic!("expected root conjunction");
        };
        assert!(matches!(&children[0], Predicate::Or(branches) if branches.len() == 2));

        assert!(parse_predicate(&json!({"$or": []})).is_err());
        assert!(parse_predicate(&json!({"$or": {"a": 1}})).is_err());
    }

    #[test]
    fn test_parse_not_and_exists() {
        let pred = parse_predicate(&json!({"a": {"$not": {"$exists": true}}})).unwrap();
        assert_eq!(
            pred.conditions_on("a"),
            vec![&Condition::Not(vec![Condition::Exists(true)])]
        );
        let pred = parse_predicate(&json!({"a": {"$exists": 0}})).unwrap();
        assert_eq!(pred.conditions_on("a"), vec![&Condition::Exists(false)]);
    }

    #[test]
    fn test_parse_regex() {
        let pred = parse_predicate(&json!({"a": {"$regex": "^x", "$options": "i"}})).unwrap();
        let conds = pred.conditions_on("a");
        assert_eq!(conds.len(), 1);
        assert!(matches!(conds[0], Condition::Regex(r) if r.options == "i"));
        assert!(matches!(
            parse_predicate(&json!({"a": {"$regex": "("}})),
            Err(QueryError::InvalidRegex(_))
        ));
    }

    #[test]
    fn test_parse_geo() {
        let pred = parse_predicate(&json!({"loc": {"$near": [1, 2], "$maxDistance": 3}})).unwrap();
        assert_eq!(pred.special_operator(), Some(("loc", "2d")));
        assert_eq!(
            pred.conditions_on("loc"),
            vec![&Condition::Near {
                point: [1.0, 2.0],
                max_distance: Some(3.0)
            }]
        );
        let within = parse_predicate(&json!({"loc": {"$within": {"$box": [[0, 0], [1, 1]]}}})).unwrap();
        assert!(within.special_operator().is_some());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_predicate(&json!({"a": {"$bogus": 1}})),
            Err(QueryError::UnknownOperator(_))
        ));
        assert!(matches!(
            parse_predicate(&json!({"$where": "x"})),
            Err(QueryError::UnknownOperator(_))
        ));
        assert!(matches!(
            parse_predicate(&json!([1])),
            Err(QueryError::NotAnObject { .. })
        ));
        assert!(parse_predicate(&json!({"a": {"$in": 4}})).is_err());
    }
}
