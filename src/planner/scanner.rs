//! Planning across the branches of a top level `$or`.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use super::error::PlanResult;
use super::plan::PlanCursor;
use super::plan_set::{PlannerContext, QueryPlanSet};
use super::race::{race_with_replan, Interrupt};
use super::request::QueryRequest;
use crate::query::Predicate;
use crate::storage::{Record, RecordId};

/// One plan set per `$or` branch, or a single set when the disjunction is
/// not split.
#[derive(Debug)]
pub struct MultiPlanScanner {
    context: PlannerContext,
    request: QueryRequest,
    branches: Vec<QueryPlanSet>,
    or_split: bool,
}

impl MultiPlanScanner {
    pub fn make(context: &PlannerContext, request: &QueryRequest) -> PlanResult<Self> {
        if request.sort.is_empty() && !request.has_min_max() {
            if let Some(branches) = Self::or_branches(context, request)? {
                return Ok(Self {
                    context: context.clone(),
                    request: request.clone(),
                    branches,
                    or_split: true,
                });
            }
        }
        let single = QueryPlanSet::for_request(context, request)?;
        Ok(Self {
            context: context.clone(),
            request: request.clone(),
            branches: vec![single],
            or_split: false,
        })
    }

    /// Plan sets for each `$or` branch; `None` when there is no top level
    /// `$or` or some branch cannot use an index.
    fn or_branches(context: &PlannerContext, request: &QueryRequest) -> PlanResult<Option<Vec<QueryPlanSet>>> {
        let Some((branches, surrounding)) = request.predicate.top_level_or() else {
            return Ok(None);
        };
        let mut sets = Vec::with_capacity(branches.len());
        for branch in branches {
            let mut clauses: Vec<Predicate> = surrounding.iter().map(|p| (*p).clone()).collect();
            match branch {
                Predicate::And(children) => clauses.extend(children.iter().cloned()),
                other => clauses.push(other.clone()),
            }
            let set = QueryPlanSet::for_request(context, &request.with_predicate(Predicate::And(clauses)))?;
            if request.hint.is_none() && set.plans().iter().all(|p| p.is_natural()) {
                debug!(
                    namespace = context.namespace(),
                    "$or branch has no usable index; planning the whole query"
                );
                return Ok(None);
            }
            sets.push(set);
        }
        Ok(Some(sets))
    }

    pub fn n_branches(&self) -> usize {
        self.branches.len()
    }

    pub fn is_or_split(&self) -> bool {
        self.or_split
    }

    pub fn branches(&self) -> &[QueryPlanSet] {
        &self.branches
    }

    /// Plans in the first branch still to run.
    pub fn current_n_plans(&self) -> usize {
        self.branches.first().map_or(0, QueryPlanSet::n_plans)
    }

    pub fn possible_in_order_plan(&self) -> bool {
        self.branches.iter().any(QueryPlanSet::possible_in_order_plan)
    }

    pub fn possible_out_of_order_plan(&self) -> bool {
        self.branches.iter().any(QueryPlanSet::possible_out_of_order_plan)
    }

    pub fn have_in_order_plan(&self) -> bool {
        self.branches.iter().all(QueryPlanSet::have_in_order_plan)
    }

    pub fn has_possibly_excluded_plans(&self) -> bool {
        self.branches.iter().any(QueryPlanSet::has_possibly_excluded_plans)
    }

    /// Run every branch in turn. A record matched by several branches is
    /// returned once; the limit applies to the union.
    pub fn run(&self, interrupt: &Interrupt, limit: Option<usize>) -> PlanResult<Vec<Record>> {
        let mut seen: HashSet<RecordId> = HashSet::new();
        let mut out = Vec::new();
        for set in &self.branches {
            if limit.is_some_and(|l| out.len() >= l) {
                break;
            }
            let branch_limit = if self.or_split { None } else { limit };
            let outcome = race_with_replan(set, branch_limit, interrupt)?;
            for record in outcome.records {
                if seen.insert(record.id) {
                    out.push(record);
                }
            }
        }
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    /// Cursor on the best statically chosen plan for the whole query.
    pub fn best_guess_cursor(&self) -> PlanResult<PlanCursor> {
        if !self.or_split {
            return Ok(self.branches[0].best_guess_plan().plan_cursor());
        }
        let whole = QueryPlanSet::for_request(&self.context, &self.request)?;
        Ok(whole.best_guess_plan().plan_cursor())
    }
}

impl fmt::Display for MultiPlanScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, set) in self.branches.iter().enumerate() {
            if self.or_split {
                writeln!(f, "$or branch {}:", i)?;
            }
            write!(f, "{}", set)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::catalog::{IndexSpec, KeyPattern, SpecialIndexRegistry};
    use crate::planner::cache::PlanCache;
    use crate::planner::config::PlannerConfig;
    use crate::planner::error::PlanError;
    use crate::planner::request::Hint;
    use crate::query::SortSpec;
    use crate::storage::{Collection, CollectionName, Cursor};
    use serde_json::{json, Value};

    fn context() -> PlannerContext {
        PlannerContext {
            collection: Arc::new(Collection::new(CollectionName::new("test.mps").unwrap())),
            cache: Arc::new(PlanCache::new()),
            specials: Arc::new(SpecialIndexRegistry::default()),
            config: PlannerConfig::default(),
        }
    }

    fn index(ctx: &PlannerContext, key: Value) {
        let spec = IndexSpec::new(KeyPattern::from_json(&key).unwrap());
        ctx.collection.add_index(&spec).unwrap();
    }

    fn request(query: Value, sort: Value) -> QueryRequest {
        QueryRequest::parse(&query)
            .unwrap()
            .sort(SortSpec::parse(&sort).unwrap())
    }

    fn scanner(ctx: &PlannerContext, query: Value, sort: Value) -> MultiPlanScanner {
        MultiPlanScanner::make(ctx, &request(query, sort)).unwrap()
    }

    #[test]
    fn test_plan_counts() {
        let ctx = context();
        index(&ctx, json!({"a": 1}));
        index(&ctx, json!({"b": 1}));

        let s = scanner(&ctx, json!({"a": 1}), json!({}));
        assert!(!s.is_or_split());
        assert_eq!(s.current_n_plans(), 1);

        let s = scanner(&ctx, json!({"$or": [{"a": 1}]}), json!({}));
        assert!(s.is_or_split());
        assert_eq!(s.current_n_plans(), 1);

        let s = scanner(&ctx, json!({"$or": [{"a": 1, "b": 1}]}), json!({}));
        assert_eq!(s.current_n_plans(), 3);

        let s = scanner(&ctx, json!({"$or": [{"a": 1}, {"b": 1}]}), json!({}));
        assert_eq!(s.n_branches(), 2);
    }

    #[test]
    fn test_sorted_or_not_split() {
        let ctx = context();
        index(&ctx, json!({"a": 1}));
        index(&ctx, json!({"b": 1}));
        let s = scanner(&ctx, json!({"$or": [{"a": 1}]}), json!({"c": 1}));
        assert!(!s.is_or_split());
        assert_eq!(s.current_n_plans(), 1);
        assert!(!s.possible_in_order_plan());
        assert!(s.possible_out_of_order_plan());
        assert!(!s.have_in_order_plan());
    }

    #[test]
    fn test_useless_or_not_split() {
        let ctx = context();
        index(&ctx, json!({"a": 1}));
        let s = scanner(&ctx, json!({"$or": [{"a": 1}, {"c": 1}]}), json!({}));
        assert!(!s.is_or_split());
        assert_eq!(s.n_branches(), 1);
    }

    #[test]
    fn test_branch_context_kept() {
        let ctx = context();
        index(&ctx, json!({"a": 1, "b": 1}));
        let s = scanner(&ctx, json!({"a": 4, "$or": [{"b": 1}, {"b": 2}]}), json!({}));
        assert!(s.is_or_split());
        for branch in s.branches() {
            assert_eq!(branch.n_plans(), 1);
            assert_eq!(branch.first_plan().index_name(), Some("a_1_b_1"));
        }
    }

    #[test]
    fn test_flags_across_branches() {
        let ctx = context();
        index(&ctx, json!({"a": 1}));
        index(&ctx, json!({"b": 1}));
        let s = scanner(&ctx, json!({"$or": [{"a": 1}, {"b": 1}]}), json!({}));
        assert!(s.possible_in_order_plan());
        assert!(!s.possible_out_of_order_plan());
        assert!(s.have_in_order_plan());
        assert!(!s.has_possibly_excluded_plans());
    }

    #[test]
    fn test_branch_error_propagates() {
        let ctx = context();
        index(&ctx, json!({"a": 1}));
        let req = request(json!({"$or": [{"a": 1}, {"b": 1}]}), json!({})).hint(Hint::Name("zz".to_string()));
        assert!(matches!(MultiPlanScanner::make(&ctx, &req), Err(PlanError::BadHint(_))));
    }

    #[test]
    fn test_run_deduplicates_branches() {
        let ctx = context();
        index(&ctx, json!({"a": 1}));
        index(&ctx, json!({"b": 1}));
        ctx.collection.insert(json!({"a": 1, "b": 1})).unwrap();
        ctx.collection.insert(json!({"a": 1, "b": 2})).unwrap();
        ctx.collection.insert(json!({"a": 2, "b": 1})).unwrap();
        ctx.collection.insert(json!({"a": 3, "b": 3})).unwrap();

        let s = scanner(&ctx, json!({"$or": [{"a": 1}, {"b": 1}]}), json!({}));
        assert!(s.is_or_split());
        let records = s.run(&Interrupt::new(), None).unwrap();
        assert_eq!(records.len(), 3);

        let limited = s.run(&Interrupt::new(), Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_best_guess_cursor() {
        let ctx = context();
        index(&ctx, json!({"a": 1}));
        index(&ctx, json!({"b": 1}));
        ctx.collection.insert(json!({"a": 1})).unwrap();
        ctx.collection.insert(json!({"b": 1})).unwrap();

        let s = scanner(&ctx, json!({"b": 1}), json!({"a": 1}));
        let cursor = s.best_guess_cursor().unwrap();
        assert!(cursor.describe().contains("a_1"));

        let s = scanner(&ctx, json!({"a": 1}), json!({"b": 1}));
        let mut cursor = s.best_guess_cursor().unwrap();
        assert!(cursor.describe().contains("b_1"));
        assert!(cursor.ok());
        assert!(cursor.current_matches());
        cursor.advance();
        assert!(cursor.ok());
        assert!(!cursor.current_matches());

        let s = scanner(&ctx, json!({"$or": [{"a": 1}, {"b": 1}]}), json!({}));
        let mut cursor = s.best_guess_cursor().unwrap();
        let mut matched = 0;
        while cursor.ok() {
            if cursor.current_matches() {
                matched += 1;
            }
            cursor.advance();
        }
        assert_eq!(matched, 2);
    }
}
