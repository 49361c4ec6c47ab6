//! Special (non B-tree) index plugins.
//!
//! A special index is declared with a string kind in its key pattern, e.g.
//! `{loc: "2d"}`. Its plugin judges whether a query can use it and builds the
//! cursor; the planner treats the resulting plan as opaque.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::index::IndexDescriptor;
use crate::query::{as_point, distance, Condition, Predicate, SortSpec};
use crate::storage::path::values_at;
use crate::storage::{BasicCursor, Collection, Cursor, Record};

/// How useful a special index is for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Suitability {
    Useless,
    Helpful,
    Optimal,
}

/// Behavior of one special index kind.
pub trait SpecialIndexPlugin: Send + Sync {
    /// Kind name as written in key patterns.
    fn kind(&self) -> &'static str;

    fn suitability(&self, index: &IndexDescriptor, predicate: &Predicate, sort: &SortSpec) -> Suitability;

    /// Whether results need an in-memory sort to honor `sort`.
    fn scan_and_order_required(&self, index: &IndexDescriptor, predicate: &Predicate, sort: &SortSpec) -> bool;

    fn new_cursor(&self, collection: &Collection, index: &IndexDescriptor, predicate: &Predicate) -> Box<dyn Cursor>;
}

/// Plugins by kind name.
#[derive(Clone)]
pub struct SpecialIndexRegistry {
    plugins: HashMap<String, Arc<dyn SpecialIndexPlugin>>,
}

impl SpecialIndexRegistry {
    /// Registry with no plugins.
    pub fn empty() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    pub fn register(&mut self, plugin: Arc<dyn SpecialIndexPlugin>) {
        self.plugins.insert(plugin.kind().to_string(), plugin);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn SpecialIndexPlugin>> {
        self.plugins.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.plugins.contains_key(kind)
    }
}

impl Default for SpecialIndexRegistry {
    /// Registry with the built-in `2d` plugin.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(GeoIndexPlugin));
        registry
    }
}

impl fmt::Debug for SpecialIndexRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.plugins.keys().collect();
        kinds.sort();
        f.debug_struct("SpecialIndexRegistry").field("kinds", &kinds).finish()
    }
}

/// Flat 2d point index: `{loc: "2d"}` over `[x, y]` values.
///
/// Serves `$near` (distance order, optional `$maxDistance`) and `$within`.
/// Any other condition on the point field makes the index usable with
/// natural order among indexed points.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoIndexPlugin;

impl GeoIndexPlugin {
    fn point_field(index: &IndexDescriptor) -> Option<&str> {
        index
            .key_pattern()
            .fields()
            .iter()
            .find(|f| f.is_special())
            .map(|f| f.path.as_str())
    }
}

impl SpecialIndexPlugin for GeoIndexPlugin {
    fn kind(&self) -> &'static str {
        "2d"
    }

    fn suitability(&self, index: &IndexDescriptor, predicate: &Predicate, _sort: &SortSpec) -> Suitability {
        let Some(field) = Self::point_field(index) else {
            return Suitability::Useless;
        };
        let conditions = predicate.conditions_on(field);
        if conditions.iter().any(|c| c.special_kind().is_some()) {
            Suitability::Optimal
        } else if !conditions.is_empty() {
            Suitability::Helpful
        } else {
            Suitability::Useless
        }
    }

    fn scan_and_order_required(&self, _index: &IndexDescriptor, _predicate: &Predicate, sort: &SortSpec) -> bool {
        !sort.is_empty()
    }

    fn new_cursor(&self, collection: &Collection, index: &IndexDescriptor, predicate: &Predicate) -> Box<dyn Cursor> {
        let Some(field) = Self::point_field(index) else {
            return Box::new(BasicCursor::over(Vec::new(), "GeoCursor"));
        };

        let mut located: Vec<([f64; 2], Record)> = collection
            .snapshot()
            .into_iter()
            .filter_map(|record| {
                let point = values_at(&record.doc, field).first().and_then(|v| as_point(v))?;
                Some((point, record))
            })
            .collect();

        for condition in predicate.conditions_on(field) {
            match condition {
                Condition::Near {
                    point,
                    max_distance,
                } => {
                    if let Some(max) = max_distance {
                        located.retain(|(p, _)| distance(*point, *p) <= *max);
                    }
                    located.sort_by(|(a, _), (b, _)| {
                        distance(*point, *a).total_cmp(&distance(*point, *b))
                    });
                }
                Condition::Within(shape) => located.retain(|(p, _)| shape.contains(*p)),
                _ => {}
            }
        }

        let records = located.into_iter().map(|(_, r)| r).collect();
        Box::new(BasicCursor::over(records, format!("GeoCursor {}", index.name())))
    }
}
