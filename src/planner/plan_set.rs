//! Candidate plan enumeration for one predicate and sort.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::cache::{CachedQueryPlan, CandidatePlanCharacter, PlanCache, PlanKey};
use super::config::PlannerConfig;
use super::error::{PlanError, PlanResult};
use super::plan::{IndexChoice, QueryPlan, Utility};
use super::request::{CachePolicy, Hint, QueryRequest};
use crate::catalog::{SpecialIndexRegistry, Suitability};
use crate::query::SortSpec;
use crate::ranges::{FieldRangeSetPair, QueryPattern};
use crate::storage::Collection;

/// What planning a query on one namespace needs.
///
/// The collection handle is cloned out of the catalog beforehand, so no
/// catalog lock is held while the plan cache is consulted.
#[derive(Debug, Clone)]
pub struct PlannerContext {
    pub collection: Arc<Collection>,
    pub cache: Arc<PlanCache>,
    pub specials: Arc<SpecialIndexRegistry>,
    pub config: PlannerConfig,
}

impl PlannerContext {
    pub fn namespace(&self) -> &str {
        self.collection.name().as_str()
    }
}

/// The candidate plans for a query, plus what is known about their order.
#[derive(Debug)]
pub struct QueryPlanSet {
    context: PlannerContext,
    request: QueryRequest,
    ranges: Arc<FieldRangeSetPair>,
    original_ranges: Arc<FieldRangeSetPair>,
    pattern: QueryPattern,
    plans: Vec<QueryPlan>,
    possible_in_order_plan: bool,
    possible_out_of_order_plan: bool,
    have_in_order_plan: bool,
    using_cached_plan: bool,
    has_possibly_excluded_plans: bool,
    cached_plan: Option<CachedQueryPlan>,
    /// False for hinted sets; their winners are not recorded.
    recordable: bool,
}

impl QueryPlanSet {
    /// Plan a request, deriving its ranges from the predicate.
    pub fn for_request(context: &PlannerContext, request: &QueryRequest) -> PlanResult<Self> {
        let ranges = Arc::new(FieldRangeSetPair::new(&request.predicate));
        Self::make(context, ranges.clone(), ranges, request)
    }

    /// Build the candidate set. Never writes to the plan cache.
    pub fn make(
        context: &PlannerContext,
        ranges: Arc<FieldRangeSetPair>,
        original_ranges: Arc<FieldRangeSetPair>,
        request: &QueryRequest,
    ) -> PlanResult<Self> {
        let pattern = QueryPattern::new(original_ranges.single_key(), &request.sort);
        let mut set = Self {
            context: context.clone(),
            request: request.clone(),
            ranges,
            original_ranges,
            pattern,
            plans: Vec::new(),
            possible_in_order_plan: false,
            possible_out_of_order_plan: false,
            have_in_order_plan: false,
            using_cached_plan: false,
            has_possibly_excluded_plans: false,
            cached_plan: None,
            recordable: true,
        };
        set.init()?;
        debug!(
            namespace = context.namespace(),
            pattern = %set.pattern,
            plans = set.plans.len(),
            cached = set.using_cached_plan,
            "query plans enumerated"
        );
        Ok(set)
    }

    fn init(&mut self) -> PlanResult<()> {
        if let Some(hint) = self.request.hint.clone() {
            let plan = self.hinted_plan(&hint)?;
            self.recordable = false;
            return self.init_single(plan);
        }
        if self.request.has_min_max() {
            let idx_no = self.min_max_index()?;
            let plan = self.make_plan(IndexChoice::Index(idx_no))?;
            self.recordable = false;
            return self.init_single(plan);
        }
        if self.request.sort.natural_direction().is_some() {
            let plan = self.make_plan(IndexChoice::Natural)?;
            return self.init_single(plan);
        }

        if let Some((_, kind)) = self.request.predicate.special_operator() {
            if !self.request.allow_special {
                return Err(PlanError::SpecialNotAllowed(kind.to_string()));
            }
            let idx_no = self
                .context
                .collection
                .indexes()
                .iter()
                .position(|index| index.special_kind() == Some(kind))
                .ok_or_else(|| PlanError::SpecialIndexNotFound(kind.to_string()))?;
            let plan = self.make_plan(IndexChoice::Index(idx_no))?;
            return self.init_single(plan);
        }

        if self.context.collection.n_indexes() == 0 {
            let plan = self.make_plan(IndexChoice::Natural)?;
            return self.init_single(plan);
        }

        let candidates = self.enumerate()?;
        let fresh = character_of(&candidates);
        if let Some(entry) = self.usable_cache_entry()? {
            let (entry, cached) = entry;
            return self.init_from_cache(entry, cached, fresh);
        }

        self.possible_in_order_plan = fresh.may_run_in_order_plan();
        self.possible_out_of_order_plan = fresh.may_run_out_of_order_plan();
        self.have_in_order_plan = candidates.iter().any(|p| !p.scan_and_order_required());
        self.plans = candidates;
        Ok(())
    }

    /// Every useful candidate, narrowed to a single plan when one is known
    /// to be best.
    fn enumerate(&self) -> PlanResult<Vec<QueryPlan>> {
        let mut candidates = Vec::new();
        for (idx_no, index) in self.context.collection.indexes().iter().enumerate() {
            if let Some(kind) = index.special_kind() {
                if !self.request.allow_special {
                    continue;
                }
                let Some(plugin) = self.context.specials.get(kind) else {
                    continue;
                };
                let suitability = plugin.suitability(index, &self.request.predicate, &self.request.sort);
                if suitability == Suitability::Useless {
                    continue;
                }
            }
            let plan = self.make_plan(IndexChoice::Index(idx_no))?;
            match plan.utility() {
                Utility::Unhelpful | Utility::Disallowed => continue,
                _ => candidates.push(plan),
            }
        }
        candidates.push(self.make_plan(IndexChoice::Natural)?);

        if let Some(pos) = candidates
            .iter()
            .position(|p| matches!(p.utility(), Utility::Optimal | Utility::Impossible))
        {
            return Ok(vec![candidates.swap_remove(pos)]);
        }

        if candidates.iter().any(|p| !p.is_natural() && !p.is_special()) {
            candidates.retain(|p| !p.is_special());
            return Ok(candidates);
        }
        if let Some(pos) = candidates.iter().position(QueryPlan::is_special) {
            return Ok(vec![candidates.swap_remove(pos)]);
        }
        Ok(candidates)
    }

    /// The cached entry and its plan, when the cache may be used and the
    /// entry is still good for this request.
    fn usable_cache_entry(&self) -> PlanResult<Option<(CachedQueryPlan, QueryPlan)>> {
        if self.request.cache_policy == CachePolicy::Ignore || !self.context.config.use_plan_cache {
            return Ok(None);
        }
        let namespace = self.context.namespace();
        let Some(entry) = self.context.cache.get(namespace, &self.pattern) else {
            return Ok(None);
        };

        let plan = match entry.index_key() {
            PlanKey::Natural => self.make_plan(IndexChoice::Natural)?,
            PlanKey::Index(key) => {
                let Some((idx_no, index)) = self.context.collection.find_index_by_key(key) else {
                    warn!(namespace, index = %key, "cached plan names a missing index");
                    return Ok(None);
                };
                if index.special_kind().is_some() && !self.request.allow_special {
                    return Ok(None);
                }
                self.make_plan(IndexChoice::Index(idx_no))?
            }
        };

        if matches!(plan.utility(), Utility::Unhelpful | Utility::Disallowed) {
            debug!(namespace, plan = %plan, "cached plan no longer usable");
            return Ok(None);
        }
        if self.request.cache_policy == CachePolicy::UseIfInOrder && plan.scan_and_order_required() {
            return Ok(None);
        }
        Ok(Some((entry, plan)))
    }

    fn init_from_cache(
        &mut self,
        entry: CachedQueryPlan,
        cached: QueryPlan,
        fresh: CandidatePlanCharacter,
    ) -> PlanResult<()> {
        let recorded = entry.character();
        debug!(namespace = self.context.namespace(), plan = %cached, "using cached plan");

        if recorded.covers(&fresh) {
            self.possible_in_order_plan = recorded.may_run_in_order_plan();
            self.possible_out_of_order_plan = recorded.may_run_out_of_order_plan();
            self.have_in_order_plan = !cached.scan_and_order_required();
            self.has_possibly_excluded_plans =
                recorded.may_run_in_order_plan() && recorded.may_run_out_of_order_plan();
            self.plans = vec![cached];
        } else {
            let combined = recorded.union(&fresh);
            let natural = !cached.is_natural();
            self.plans = vec![cached];
            if natural {
                self.plans.push(self.make_plan(IndexChoice::Natural)?);
            }
            self.possible_in_order_plan = combined.may_run_in_order_plan();
            self.possible_out_of_order_plan = combined.may_run_out_of_order_plan();
            self.have_in_order_plan = self.plans.iter().any(|p| !p.scan_and_order_required());
            self.has_possibly_excluded_plans = true;
        }
        self.using_cached_plan = true;
        self.cached_plan = Some(entry);
        Ok(())
    }

    fn init_single(&mut self, plan: QueryPlan) -> PlanResult<()> {
        let in_order = !plan.scan_and_order_required();
        self.possible_in_order_plan = in_order;
        self.possible_out_of_order_plan = !in_order;
        self.have_in_order_plan = in_order;
        self.plans = vec![plan];
        Ok(())
    }

    fn hinted_plan(&self, hint: &Hint) -> PlanResult<QueryPlan> {
        let collection = &self.context.collection;
        let found = match hint {
            Hint::Natural(direction) => {
                let mut request = self.request.clone();
                if request.sort.is_empty() {
                    request.sort = SortSpec::natural(*direction);
                }
                return QueryPlan::make(
                    &self.context,
                    IndexChoice::Natural,
                    &self.ranges,
                    &self.original_ranges,
                    &request,
                );
            }
            Hint::Name(name) => collection.find_index_by_name(name),
            Hint::KeyPattern(key) => collection.find_index_by_key(key),
        };
        let (idx_no, index) = found.ok_or_else(|| PlanError::BadHint(format!("no index {}", hint)))?;
        if index.special_kind().is_some() && !self.request.allow_special {
            return Err(PlanError::SpecialNotAllowed(index.name().to_string()));
        }
        let plan = self.make_plan(IndexChoice::Index(idx_no))?;
        if plan.utility() == Utility::Disallowed {
            return Err(PlanError::BadHint(format!(
                "sparse index {} cannot answer this query",
                index.name()
            )));
        }
        Ok(plan)
    }

    /// The index whose key pattern names exactly the min/max fields.
    fn min_max_index(&self) -> PlanResult<usize> {
        let fields_of = |bound: &Option<serde_json::Value>| -> PlanResult<Option<Vec<String>>> {
            match bound {
                None => Ok(None),
                Some(serde_json::Value::Object(map)) if !map.is_empty() => {
                    Ok(Some(map.keys().cloned().collect()))
                }
                Some(other) => Err(PlanError::BadMinMax(format!("expected a key object, got {}", other))),
            }
        };
        let min_fields = fields_of(&self.request.min)?;
        let max_fields = fields_of(&self.request.max)?;
        let fields = match (min_fields, max_fields) {
            (Some(min), Some(max)) if min != max => {
                return Err(PlanError::BadMinMax("min and max must name the same fields".to_string()))
            }
            (Some(fields), _) | (None, Some(fields)) => fields,
            (None, None) => return Err(PlanError::BadMinMax("no bounds given".to_string())),
        };
        self.context
            .collection
            .indexes()
            .iter()
            .position(|index| {
                index.special_kind().is_none()
                    && index.key_pattern().len() == fields.len()
                    && index.key_pattern().fields().iter().zip(&fields).all(|(k, f)| k.path == *f)
            })
            .ok_or_else(|| PlanError::BadMinMax(format!("no index on fields {:?}", fields)))
    }

    fn make_plan(&self, choice: IndexChoice) -> PlanResult<QueryPlan> {
        QueryPlan::make(&self.context, choice, &self.ranges, &self.original_ranges, &self.request)
    }

    /// Record a race winner for this query pattern.
    ///
    /// Hinted sets and sets already running a cached plan record nothing.
    pub fn record_winner(&self, plan_index: usize, n_scanned: u64) -> PlanResult<bool> {
        let plan = self.plan(plan_index)?;
        if !self.recordable || self.using_cached_plan || !self.context.config.use_plan_cache {
            return Ok(false);
        }
        let entry = CachedQueryPlan::new(plan.plan_key(), n_scanned, self.character());
        self.context
            .cache
            .register(self.context.namespace(), self.pattern.clone(), entry);
        Ok(true)
    }

    /// Same request, planned again without the cache.
    pub fn replan_ignoring_cache(&self) -> PlanResult<QueryPlanSet> {
        let request = self.request.clone().cache_policy(CachePolicy::Ignore);
        Self::make(&self.context, self.ranges.clone(), self.original_ranges.clone(), &request)
    }

    pub fn n_plans(&self) -> usize {
        self.plans.len()
    }

    pub fn first_plan(&self) -> &QueryPlan {
        &self.plans[0]
    }

    pub fn plans(&self) -> &[QueryPlan] {
        &self.plans
    }

    pub fn plan(&self, i: usize) -> PlanResult<&QueryPlan> {
        self.plans.get(i).ok_or(PlanError::InvalidIndexNumber {
            index: i,
            count: self.plans.len(),
        })
    }

    /// Statically chosen plan: the cached one, else the first in-order plan
    /// when a sort is requested, else the first plan.
    pub fn best_guess_plan(&self) -> &QueryPlan {
        if !self.using_cached_plan && !self.request.sort.is_empty() {
            if let Some(plan) = self.plans.iter().find(|p| !p.scan_and_order_required()) {
                return plan;
            }
        }
        self.first_plan()
    }

    pub fn possible_in_order_plan(&self) -> bool {
        self.possible_in_order_plan
    }

    pub fn possible_out_of_order_plan(&self) -> bool {
        self.possible_out_of_order_plan
    }

    pub fn have_in_order_plan(&self) -> bool {
        self.have_in_order_plan
    }

    pub fn using_cached_plan(&self) -> bool {
        self.using_cached_plan
    }

    pub fn has_possibly_excluded_plans(&self) -> bool {
        self.has_possibly_excluded_plans
    }

    pub fn cached_plan(&self) -> Option<&CachedQueryPlan> {
        self.cached_plan.as_ref()
    }

    /// Character recorded with a winner from this set.
    pub fn character(&self) -> CandidatePlanCharacter {
        CandidatePlanCharacter::new(self.possible_in_order_plan, self.possible_out_of_order_plan)
    }

    pub fn pattern(&self) -> &QueryPattern {
        &self.pattern
    }

    pub fn request(&self) -> &QueryRequest {
        &self.request
    }

    pub fn context(&self) -> &PlannerContext {
        &self.context
    }

    pub fn ranges(&self) -> &FieldRangeSetPair {
        &self.ranges
    }
}

fn character_of(plans: &[QueryPlan]) -> CandidatePlanCharacter {
    CandidatePlanCharacter::new(
        plans.iter().any(|p| !p.scan_and_order_required()),
        plans.iter().any(QueryPlan::scan_and_order_required),
    )
}

impl fmt::Display for QueryPlanSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pattern: {}", self.pattern)?;
        if let Some(cached) = &self.cached_plan {
            writeln!(f, "cached: {}", cached)?;
        }
        for plan in &self.plans {
            writeln!(f, "  {}", plan)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{IndexSpec, KeyPattern};
    use crate::query::Projection;
    use crate::storage::CollectionName;
    use serde_json::{json, Value};

    struct Fixture {
        context: PlannerContext,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                context: PlannerContext {
                    collection: Arc::new(Collection::new(CollectionName::new("test.qps").unwrap())),
                    cache: Arc::new(PlanCache::new()),
                    specials: Arc::new(SpecialIndexRegistry::default()),
                    config: PlannerConfig::default(),
                },
            }
        }

        fn index(&self, key: Value) {
            let spec = IndexSpec::new(KeyPattern::from_json(&key).unwrap());
            self.context.collection.add_index(&spec).unwrap();
        }

        fn sparse_index(&self, key: Value) {
            let spec = IndexSpec::new(KeyPattern::from_json(&key).unwrap()).sparse(true);
            self.context.collection.add_index(&spec).unwrap();
        }

        fn plan_set(&self, request: &QueryRequest) -> QueryPlanSet {
            QueryPlanSet::for_request(&self.context, request).unwrap()
        }

        fn n_plans(&self, query: Value, sort: Value) -> usize {
            self.plan_set(&request(query, sort)).n_plans()
        }

        fn cache(&self, query: Value, sort: Value, key: PlanKey, character: CandidatePlanCharacter) {
            let req = request(query, sort);
            let ranges = FieldRangeSetPair::new(&req.predicate);
            let pattern = QueryPattern::new(ranges.single_key(), &req.sort);
            self.context.cache.register(
                self.context.namespace(),
                pattern,
                CachedQueryPlan::new(key, 1, character),
            );
        }
    }

    fn request(query: Value, sort: Value) -> QueryRequest {
        QueryRequest::parse(&query)
            .unwrap()
            .sort(SortSpec::parse(&sort).unwrap())
    }

    fn index_key(key: Value) -> PlanKey {
        PlanKey::Index(KeyPattern::from_json(&key).unwrap())
    }

    #[test]
    fn test_no_indexes() {
        let fx = Fixture::new();
        assert_eq!(fx.n_plans(json!({"a": 4}), json!({})), 1);
        assert!(fx.plan_set(&request(json!({"a": 4}), json!({}))).first_plan().is_natural());
    }

    #[test]
    fn test_optimal_selected_alone() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.index(json!({"b": 1}));
        let set = fx.plan_set(&request(json!({"a": 4}), json!({})));
        assert_eq!(set.n_plans(), 1);
        assert_eq!(set.first_plan().index_name(), Some("a_1"));
    }

    #[test]
    fn test_optimal_selected_alone_in_either_declaration_order() {
        let orders = [
            (json!({"a": 1}), json!({"a": 1, "b": 1})),
            (json!({"a": 1, "b": 1}), json!({"a": 1})),
        ];
        for (first, second) in orders {
            let fx = Fixture::new();
            fx.index(first.clone());
            fx.index(second);
            let set = fx.plan_set(&request(json!({"a": 4}), json!({"a": 1})));
            assert_eq!(set.n_plans(), 1);
            assert_eq!(set.first_plan().utility(), Utility::Optimal);
            assert_eq!(
                set.first_plan().index().map(|i| i.key_pattern().clone()),
                Some(KeyPattern::from_json(&first).unwrap())
            );
        }
    }

    #[test]
    fn test_no_optimal() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.index(json!({"b": 1}));
        assert_eq!(fx.n_plans(json!({"a": 4}), json!({"b": 1})), 3);
    }

    #[test]
    fn test_empty_query_without_indexes() {
        let fx = Fixture::new();
        assert_eq!(fx.n_plans(json!({}), json!({})), 1);
    }

    #[test]
    fn test_hint_forms() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.index(json!({"b": 1}));
        let by_key = request(json!({"a": 1}), json!({"b": 1}))
            .hint(Hint::parse(&json!({"a": 1})).unwrap());
        assert_eq!(fx.plan_set(&by_key).n_plans(), 1);
        assert_eq!(fx.plan_set(&by_key).first_plan().index_name(), Some("a_1"));

        let by_name = request(json!({"a": 1}), json!({"b": 1})).hint(Hint::Name("a_1".to_string()));
        assert_eq!(fx.plan_set(&by_name).first_plan().index_name(), Some("a_1"));

        let natural = request(json!({"a": 1}), json!({"b": 1})).hint(Hint::Natural(1));
        let set = fx.plan_set(&natural);
        assert_eq!(set.n_plans(), 1);
        assert!(set.first_plan().is_natural());
    }

    #[test]
    fn test_bad_hint() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        let req = request(json!({"a": 1}), json!({})).hint(Hint::Name("nope".to_string()));
        let err = QueryPlanSet::for_request(&fx.context, &req).unwrap_err();
        assert!(matches!(err, PlanError::BadHint(_)));
        assert!(err.is_user_error());

        let req = request(json!({"a": 1}), json!({})).hint(Hint::parse(&json!({"b": 1})).unwrap());
        assert!(matches!(
            QueryPlanSet::for_request(&fx.context, &req),
            Err(PlanError::BadHint(_))
        ));
    }

    #[test]
    fn test_hinted_sparse_index_disallowed() {
        let fx = Fixture::new();
        fx.sparse_index(json!({"a": 1}));
        let req = request(json!({"a": {"$exists": false}}), json!({})).hint(Hint::Name("a_1".to_string()));
        assert!(matches!(
            QueryPlanSet::for_request(&fx.context, &req),
            Err(PlanError::BadHint(_))
        ));
    }

    #[test]
    fn test_natural_sort() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        let set = fx.plan_set(&request(json!({"a": 1}), json!({"$natural": -1})));
        assert_eq!(set.n_plans(), 1);
        assert!(set.first_plan().is_natural());
        assert_eq!(set.first_plan().direction(), -1);
    }

    #[test]
    fn test_min_max() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.index(json!({"b": 1}));
        let req = request(json!({}), json!({})).min(json!({"b": 2})).max(json!({"b": 8}));
        let set = fx.plan_set(&req);
        assert_eq!(set.n_plans(), 1);
        assert_eq!(set.first_plan().index_name(), Some("b_1"));

        let mismatched = request(json!({}), json!({})).min(json!({"a": 2})).max(json!({"b": 8}));
        assert!(matches!(
            QueryPlanSet::for_request(&fx.context, &mismatched),
            Err(PlanError::BadMinMax(_))
        ));
        let unknown = request(json!({}), json!({})).min(json!({"c": 2}));
        assert!(matches!(
            QueryPlanSet::for_request(&fx.context, &unknown),
            Err(PlanError::BadMinMax(_))
        ));
    }

    #[test]
    fn test_unhelpful_dropped() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1, "b": 1}));
        fx.index(json!({"b": 1}));
        let set = fx.plan_set(&request(json!({"b": 1, "c": 1}), json!({})));
        assert_eq!(set.n_plans(), 2);
        assert_eq!(set.first_plan().index_name(), Some("b_1"));
        assert!(set.plans()[1].is_natural());
    }

    #[test]
    fn test_sparse_disallowed_dropped() {
        let fx = Fixture::new();
        fx.sparse_index(json!({"a": 1}));
        let set = fx.plan_set(&request(json!({"a": {"$exists": false}}), json!({})));
        assert_eq!(set.n_plans(), 1);
        assert!(set.first_plan().is_natural());
    }

    #[test]
    fn test_impossible_selected_alone() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.index(json!({"b": 1}));
        let set = fx.plan_set(&request(json!({"a": 1, "b": {"$in": []}}), json!({"c": 1})));
        assert_eq!(set.n_plans(), 1);
        assert_eq!(set.first_plan().utility(), Utility::Impossible);
    }

    #[test]
    fn test_possible_plan_flags() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.index(json!({"b": 1}));

        let set = fx.plan_set(&request(json!({"a": 1}), json!({})));
        assert!(set.possible_in_order_plan());
        assert!(!set.possible_out_of_order_plan());
        assert!(set.have_in_order_plan());

        let set = fx.plan_set(&request(json!({"a": 1}), json!({"b": 1})));
        assert_eq!(set.n_plans(), 3);
        assert!(set.possible_in_order_plan());
        assert!(set.possible_out_of_order_plan());
        assert!(set.have_in_order_plan());

        let set = fx.plan_set(&request(json!({"a": 1}), json!({"c": 1})));
        assert_eq!(set.n_plans(), 2);
        assert!(!set.possible_in_order_plan());
        assert!(set.possible_out_of_order_plan());
        assert!(!set.have_in_order_plan());
    }

    #[test]
    fn test_cached_plan_flags() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.index(json!({"b": 1}));

        fx.cache(json!({"a": 1}), json!({}), index_key(json!({"a": 1})), CandidatePlanCharacter::new(true, false));
        let set = fx.plan_set(&request(json!({"a": 1}), json!({})));
        assert_eq!(set.n_plans(), 1);
        assert!(set.using_cached_plan());
        assert!(set.possible_in_order_plan());
        assert!(!set.possible_out_of_order_plan());
        assert!(set.have_in_order_plan());
        assert!(!set.has_possibly_excluded_plans());

        fx.cache(json!({"a": 1}), json!({"b": 1}), index_key(json!({"a": 1})), CandidatePlanCharacter::new(true, true));
        let set = fx.plan_set(&request(json!({"a": 1}), json!({"b": 1})));
        assert_eq!(set.n_plans(), 1);
        assert_eq!(set.first_plan().index_name(), Some("a_1"));
        assert!(set.using_cached_plan());
        assert!(set.possible_in_order_plan());
        assert!(set.possible_out_of_order_plan());
        assert!(!set.have_in_order_plan());
        assert!(set.has_possibly_excluded_plans());
    }

    #[test]
    fn test_cached_plan_adds_natural_fallback() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.index(json!({"b": 1}));
        fx.cache(json!({"a": 1}), json!({"b": 1}), index_key(json!({"a": 1})), CandidatePlanCharacter::new(false, true));
        let set = fx.plan_set(&request(json!({"a": 1}), json!({"b": 1})));
        assert_eq!(set.n_plans(), 2);
        assert!(set.plans()[1].is_natural());
        assert!(set.possible_in_order_plan());
        assert!(set.possible_out_of_order_plan());
        assert!(set.has_possibly_excluded_plans());
    }

    #[test]
    fn test_cache_policies() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.index(json!({"b": 1}));
        fx.cache(json!({"a": 1}), json!({"b": 1}), index_key(json!({"a": 1})), CandidatePlanCharacter::new(true, true));

        let ignore = request(json!({"a": 1}), json!({"b": 1})).cache_policy(CachePolicy::Ignore);
        let set = fx.plan_set(&ignore);
        assert!(!set.using_cached_plan());
        assert_eq!(set.n_plans(), 3);

        let in_order = request(json!({"a": 1}), json!({"b": 1})).cache_policy(CachePolicy::UseIfInOrder);
        let set = fx.plan_set(&in_order);
        assert!(!set.using_cached_plan());
        assert_eq!(set.n_plans(), 3);

        fx.cache(json!({"a": 1}), json!({"b": 1}), index_key(json!({"b": 1})), CandidatePlanCharacter::new(true, true));
        let set = fx.plan_set(&in_order);
        assert!(set.using_cached_plan());
        assert_eq!(set.first_plan().index_name(), Some("b_1"));
    }

    #[test]
    fn test_unhelpful_cached_plan_ignored() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.index(json!({"b": 1}));
        fx.cache(json!({"a": 1}), json!({}), index_key(json!({"b": 1})), CandidatePlanCharacter::new(true, false));
        let set = fx.plan_set(&request(json!({"a": 1}), json!({})));
        assert!(!set.using_cached_plan());
        assert_eq!(set.first_plan().index_name(), Some("a_1"));
    }

    #[test]
    fn test_disallowed_cached_plan_ignored() {
        let fx = Fixture::new();
        fx.sparse_index(json!({"a": 1}));
        fx.cache(
            json!({"a": {"$exists": false}}),
            json!({}),
            index_key(json!({"a": 1})),
            CandidatePlanCharacter::new(true, false),
        );
        let set = fx.plan_set(&request(json!({"a": {"$exists": false}}), json!({})));
        assert!(!set.using_cached_plan());
        assert!(set.first_plan().is_natural());
    }

    #[test]
    fn test_cached_plan_for_dropped_index_ignored() {
        let fx = Fixture::new();
        fx.index(json!({"b": 1}));
        fx.cache(json!({"b": 1}), json!({}), index_key(json!({"a": 1})), CandidatePlanCharacter::new(true, false));
        let set = fx.plan_set(&request(json!({"b": 1}), json!({})));
        assert!(!set.using_cached_plan());
        assert_eq!(set.first_plan().index_name(), Some("b_1"));
    }

    #[test]
    fn test_construction_does_not_record() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.plan_set(&request(json!({"a": 1}), json!({})));
        assert_eq!(fx.context.cache.len(fx.context.namespace()), 0);
    }

    #[test]
    fn test_record_winner() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.index(json!({"b": 1}));
        let set = fx.plan_set(&request(json!({"a": 1}), json!({"b": 1})));
        assert!(set.record_winner(1, 7).unwrap());
        let entry = fx.context.cache.get(fx.context.namespace(), set.pattern()).unwrap();
        assert_eq!(entry.index_key(), &index_key(json!({"b": 1})));
        assert_eq!(entry.n_scanned(), 7);
        assert_eq!(entry.character(), CandidatePlanCharacter::new(true, true));

        assert!(matches!(
            set.record_winner(9, 1),
            Err(PlanError::InvalidIndexNumber { index: 9, count: 3 })
        ));

        let hinted = fx.plan_set(&request(json!({"a": 2}), json!({})).hint(Hint::Name("b_1".to_string())));
        assert!(!hinted.record_winner(0, 1).unwrap());
    }

    #[test]
    fn test_special_plans() {
        let fx = Fixture::new();
        fx.index(json!({"loc": "2d"}));
        fx.index(json!({"a": 1}));

        let set = fx.plan_set(&request(json!({"loc": {"$near": [50, 50]}}), json!({})));
        assert_eq!(set.n_plans(), 1);
        assert_eq!(set.first_plan().special(), Some("2d"));

        let set = fx.plan_set(&request(json!({"loc": {"$near": [50, 50]}, "a": 1}), json!({})));
        assert_eq!(set.n_plans(), 1);
        assert_eq!(set.first_plan().special(), Some("2d"));

        let not_allowed = request(json!({"loc": {"$near": [50, 50]}}), json!({})).allow_special(false);
        assert!(matches!(
            QueryPlanSet::for_request(&fx.context, &not_allowed),
            Err(PlanError::SpecialNotAllowed(_))
        ));
    }

    #[test]
    fn test_special_index_not_found() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        let err = QueryPlanSet::for_request(&fx.context, &request(json!({"loc": {"$near": [0, 0]}}), json!({})))
            .unwrap_err();
        assert!(matches!(err, PlanError::SpecialIndexNotFound(_)));
    }

    #[test]
    fn test_special_index_as_candidate() {
        let fx = Fixture::new();
        fx.index(json!({"loc": "2d"}));
        let set = fx.plan_set(&request(json!({"loc": [1, 1]}), json!({})));
        assert_eq!(set.n_plans(), 1);
        assert_eq!(set.first_plan().special(), Some("2d"));

        let no_special = request(json!({"loc": [1, 1]}), json!({})).allow_special(false);
        let set = fx.plan_set(&no_special);
        assert_eq!(set.n_plans(), 1);
        assert!(set.first_plan().is_natural());

        fx.index(json!({"loc": 1}));
        let set = fx.plan_set(&request(json!({"loc": [1, 1]}), json!({})));
        assert!(set.plans().iter().all(|p| !p.is_special()));
    }

    #[test]
    fn test_cached_special_plan_not_allowed() {
        let fx = Fixture::new();
        fx.index(json!({"loc": "2d"}));
        fx.cache(json!({"loc": [1, 1]}), json!({}), index_key(json!({"loc": "2d"})), CandidatePlanCharacter::new(true, false));
        let set = fx.plan_set(&request(json!({"loc": [1, 1]}), json!({})).allow_special(false));
        assert!(!set.using_cached_plan());
        assert!(set.first_plan().is_natural());
    }

    #[test]
    fn test_best_guess_plan() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        fx.index(json!({"b": 1}));
        let set = fx.plan_set(&request(json!({"b": 1}), json!({"a": 1})));
        assert_eq!(set.best_guess_plan().index_name(), Some("a_1"));
        let set = fx.plan_set(&request(json!({"a": 1}), json!({"b": 1})));
        assert_eq!(set.best_guess_plan().index_name(), Some("b_1"));
    }

    #[test]
    fn test_key_fields_only_carried() {
        let fx = Fixture::new();
        fx.index(json!({"a": 1}));
        let req = request(json!({"a": 1}), json!({}))
            .projection(Projection::parse(&json!({"_id": 0, "a": 1})).unwrap());
        assert!(fx.plan_set(&req).first_plan().key_fields_only().is_some());
    }
}
