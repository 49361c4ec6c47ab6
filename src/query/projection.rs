//! Field projections such as `{_id: 0, a: 1}`.

use serde_json::{Map, Value};

use super::error::{QueryError, QueryResult};
use crate::storage::path::{set_path, values_at};

/// Whether listed fields are kept or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    Include,
    Exclude,
}

/// A parsed projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    mode: ProjectionMode,
    fields: Vec<String>,
    include_id: bool,
}

impl Projection {
    pub fn parse(value: &Value) -> QueryResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| QueryError::InvalidProjection(format!("expected an object, got {}", value)))?;

        let mut include_id = true;
        let mut mode = None;
        let mut fields = Vec::new();
        for (path, flag) in map {
            let keep = match flag {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                other => {
                    return Err(QueryError::InvalidProjection(format!(
                        "bad value for {}: {}",
                        path, other
                    )))
                }
            };
            if path == "_id" {
                include_id = keep;
                continue;
            }
            let field_mode = if keep {
                ProjectionMode::Include
            } else {
                ProjectionMode::Exclude
            };
            match mode {
                None => mode = Some(field_mode),
                Some(m) if m != field_mode => {
                    return Err(QueryError::InvalidProjection(
                        "cannot mix inclusion and exclusion".to_string(),
                    ))
                }
                Some(_) => {}
            }
            fields.push(path.clone());
        }

        Ok(Self {
            mode: mode.unwrap_or(ProjectionMode::Exclude),
            fields,
            include_id,
        })
    }

    pub fn mode(&self) -> ProjectionMode {
        self.mode
    }

    /// Fields named by the projection, excluding `_id`.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn includes_id(&self) -> bool {
        self.include_id
    }

    pub fn is_inclusion(&self) -> bool {
        self.mode == ProjectionMode::Include
    }

    /// Apply the projection to a document.
    pub fn apply(&self, doc: &Value) -> Value {
        match self.mode {
            ProjectionMode::Include => {
                let mut out = Value::Object(Map::new());
                if self.include_id {
                    if let Some(id) = doc.get("_id") {
                        set_path(&mut out, "_id", id.clone());
                    }
                }
                for field in &self.fields {
                    if let Some(value) = values_at(doc, field).first() {
                        set_path(&mut out, field, (*value).clone());
                    }
                }
                out
            }
            ProjectionMode::Exclude => {
                let mut out = doc.clone();
                if let Value::Object(map) = &mut out {
                    if !self.include_id {
                        map.shift_remove("_id");
                    }
                    for field in &self.fields {
                        remove_path(map, field);
                    }
                }
                out
            }
        }
    }
}

fn remove_path(map: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            map.shift_remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = map.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}
