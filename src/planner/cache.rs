//! Plan cache: winning plans per query shape.
//!
//! Entries are advisory. A stale entry can make a query slower, never wrong,
//! because every candidate document is still checked by the matcher.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::catalog::KeyPattern;
use crate::ranges::QueryPattern;

/// Which orders a plan set could deliver results in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct CandidatePlanCharacter {
    in_order: bool,
    out_of_order: bool,
}

impl CandidatePlanCharacter {
    pub fn new(in_order: bool, out_of_order: bool) -> Self {
        Self {
            in_order,
            out_of_order,
        }
    }

    /// Some candidate returns results in the requested order.
    pub fn may_run_in_order_plan(&self) -> bool {
        self.in_order
    }

    /// Some candidate needs an explicit sort.
    pub fn may_run_out_of_order_plan(&self) -> bool {
        self.out_of_order
    }

    pub fn is_valid(&self) -> bool {
        self.in_order || self.out_of_order
    }

    /// True when every order `other` allows is allowed here too.
    pub fn covers(&self, other: &CandidatePlanCharacter) -> bool {
        (self.in_order || !other.in_order) && (self.out_of_order || !other.out_of_order)
    }

    pub fn union(&self, other: &CandidatePlanCharacter) -> CandidatePlanCharacter {
        CandidatePlanCharacter::new(
            self.in_order || other.in_order,
            self.out_of_order || other.out_of_order,
        )
    }
}

/// The index a cached plan used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum PlanKey {
    Natural,
    Index(KeyPattern),
}

impl fmt::Display for PlanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanKey::Natural => write!(f, r#"{{"$natural":1}}"#),
            PlanKey::Index(key) => write!(f, "{}", key),
        }
    }
}

/// A recorded race winner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedQueryPlan {
    index_key: PlanKey,
    n_scanned: u64,
    character: CandidatePlanCharacter,
    recorded_at: DateTime<Utc>,
}

impl CachedQueryPlan {
    pub fn new(index_key: PlanKey, n_scanned: u64, character: CandidatePlanCharacter) -> Self {
        Self {
            index_key,
            n_scanned,
            character,
            recorded_at: Utc::now(),
        }
    }

    pub fn index_key(&self) -> &PlanKey {
        &self.index_key
    }

    /// Documents the winner had scanned when it won.
    pub fn n_scanned(&self) -> u64 {
        self.n_scanned
    }

    pub fn character(&self) -> CandidatePlanCharacter {
        self.character
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl fmt::Display for CachedQueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nscanned: {} inOrder: {} outOfOrder: {}",
            self.index_key, self.n_scanned, self.character.in_order, self.character.out_of_order
        )
    }
}

/// Cached plans keyed by (namespace, query pattern).
///
/// One narrow mutex guards the whole map; it is held only for the duration
/// of a lookup or update.
#[derive(Debug, Default)]
pub struct PlanCache {
    entries: Mutex<HashMap<String, HashMap<QueryPattern, CachedQueryPlan>>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, pattern: &QueryPattern) -> Option<CachedQueryPlan> {
        self.entries
            .lock()
            .get(namespace)
            .and_then(|plans| plans.get(pattern))
            .cloned()
    }

    /// Record a plan, replacing any previous entry for the pattern.
    pub fn register(&self, namespace: &str, pattern: QueryPattern, plan: CachedQueryPlan) {
        debug!(namespace, %pattern, plan = %plan, "plan recorded");
        self.entries
            .lock()
            .entry(namespace.to_string())
            .or_default()
            .insert(pattern, plan);
    }

    /// Drop every entry for a namespace; returns how many were dropped.
    pub fn clear_namespace(&self, namespace: &str) -> usize {
        let dropped = self
            .entries
            .lock()
            .remove(namespace)
            .map_or(0, |plans| plans.len());
        if dropped > 0 {
            debug!(namespace, dropped, "plan cache cleared");
        }
        dropped
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of entries for a namespace.
    pub fn len(&self, namespace: &str) -> usize {
        self.entries.lock().get(namespace).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().values().all(HashMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{parse_predicate, SortSpec};
    use crate::ranges::FieldRangeSet;
    use serde_json::json;

    fn pattern(query: serde_json::Value) -> QueryPattern {
        let pred = parse_predicate(&query).unwrap();
        QueryPattern::new(&FieldRangeSet::new(&pred, true), &SortSpec::none())
    }

    fn key(value: serde_json::Value) -> PlanKey {
        PlanKey::Index(KeyPattern::from_json(&value).unwrap())
    }

    #[test]
    fn test_character_coverage() {
        let both = CandidatePlanCharacter::new(true, true);
        let in_only = CandidatePlanCharacter::new(true, false);
        let out_only = CandidatePlanCharacter::new(false, true);
        assert!(both.covers(&in_only));
        assert!(both.covers(&out_only));
        assert!(!in_only.covers(&both));
        assert!(!in_only.covers(&out_only));
        assert_eq!(in_only.union(&out_only), both);
        assert!(!CandidatePlanCharacter::default().is_valid());
    }

    #[test]
    fn test_register_and_get() {
        let cache = PlanCache::new();
        let p = pattern(json!({"a": 1}));
        assert!(cache.get("test.a", &p).is_none());

        let plan = CachedQueryPlan::new(key(json!({"a": 1})), 3, CandidatePlanCharacter::new(true, false));
        cache.register("test.a", p.clone(), plan.clone());
        assert_eq!(cache.get("test.a", &pattern(json!({"a": 99}))), Some(plan));
        assert!(cache.get("test.b", &p).is_none());

        let replaced = CachedQueryPlan::new(PlanKey::Natural, 10, CandidatePlanCharacter::new(true, false));
        cache.register("test.a", p.clone(), replaced);
        assert_eq!(cache.get("test.a", &p).map(|c| c.n_scanned()), Some(10));
        assert_eq!(cache.len("test.a"), 1);
    }

    #[test]
    fn test_clear_namespace() {
        let cache = PlanCache::new();
        let character = CandidatePlanCharacter::new(true, false);
        cache.register("test.a", pattern(json!({"a": 1})), CachedQueryPlan::new(PlanKey::Natural, 1, character));
        cache.register("test.a", pattern(json!({"b": 1})), CachedQueryPlan::new(PlanKey::Natural, 1, character));
        cache.register("test.b", pattern(json!({"a": 1})), CachedQueryPlan::new(PlanKey::Natural, 1, character));
        assert_eq!(cache.clear_namespace("test.a"), 2);
        assert_eq!(cache.len("test.a"), 0);
        assert_eq!(cache.len("test.b"), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(PlanKey::Natural.to_string(), r#"{"$natural":1}"#);
        let plan = CachedQueryPlan::new(key(json!({"a": 1})), 4, CandidatePlanCharacter::new(true, true));
        assert_eq!(plan.to_string(), r#"{"a":1} nscanned: 4 inOrder: true outOfOrder: true"#);
    }
}
