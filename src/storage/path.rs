//! dotted field path lookup.

use serde_json::Value;

/// Collect the values reachable at a dotted path.
///
/// Arrays met before the last path component are traversed element-wise, and
/// numeric components index into arrays, so `a.b` on `{a: [{b: 1}, {b: 2}]}`
/// yields `1` and `2`. A leaf that is itself an array is returned as one value;
/// callers decide whether to expand it. A missing path yields nothing.
pub fn values_at<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    values_through_arrays(doc, path).0
}

/// Like [`values_at`], also reporting whether an array was traversed
/// element-wise on the way to the leaves.
pub fn values_through_arrays<'a>(doc: &'a Value, path: &str) -> (Vec<&'a Value>, bool) {
    let parts: Vec<&str> = if path.is_empty() {
        vec![""]
    } else {
        path.split('.').collect()
    };
    let mut out = Vec::new();
    let mut expanded = false;
    collect(doc, &parts, &mut out, &mut expanded);
    (out, expanded)
}

fn collect<'a>(current: &'a Value, parts: &[&str], out: &mut Vec<&'a Value>, expanded: &mut bool) {
    let Some((head, rest)) = parts.split_first() else {
        out.push(current);
        return;
    };

    match current {
        Value::Object(map) => {
            if let Some(next) = map.get(*head) {
                collect(next, rest, out, expanded);
            }
        }
        Value::Array(items) => {
            if let Ok(idx) = head.parse::<usize>() {
                if let Some(next) = items.get(idx) {
                    collect(next, rest, out, expanded);
                }
                return;
            }
            *expanded = true;
            for item in items {
                if item.is_object() {
                    collect(item, parts, out, expanded);
                }
            }
        }
        _ => {}
    }
}

/// Set a dotted path inside an object, creating intermediate objects.
pub fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut current = doc;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}
