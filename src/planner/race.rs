//! Racing candidate plans.
//!
//! Candidates are stepped round-robin, one scanned entry each per turn.
//! There is no threading: the step is the only suspension point, and
//! interruption is checked before every step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::error::{PlanError, PlanResult};
use super::plan_set::QueryPlanSet;
use crate::query::{DocumentMatcher, Matcher};
use crate::storage::{Cursor, Record};

/// Kill switch and optional deadline for a running query.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    killed: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt that also fires once `budget` has elapsed.
    pub fn with_deadline(budget: Duration) -> Self {
        Self {
            killed: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + budget),
        }
    }

    /// Kill every query sharing this interrupt.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }

    pub fn check(&self) -> PlanResult<()> {
        if self.killed.load(Ordering::Acquire) {
            return Err(PlanError::Interrupted("operation killed".to_string()));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(PlanError::Interrupted("time limit exceeded".to_string()));
        }
        Ok(())
    }
}

/// Result of a finished race.
#[derive(Debug)]
pub struct RaceOutcome {
    /// Index of the winning plan in its set.
    pub winner: usize,
    /// Entries the winner had scanned when it won.
    pub n_scanned: u64,
    /// Matching records in output order, limited.
    pub records: Vec<Record>,
    /// Whether the winner was written to the plan cache.
    pub recorded: bool,
}

/// How a race ended.
#[derive(Debug)]
pub enum RaceResult {
    Finished(RaceOutcome),
    /// The cached plan ran far past its recorded cost; re-plan without the
    /// cache.
    CachedPlanAbandoned { n_scanned: u64 },
}

struct Contestant {
    plan: usize,
    cursor: Box<dyn Cursor>,
    matcher: DocumentMatcher,
    in_order: bool,
    matches: Vec<Record>,
    done: bool,
}

impl Contestant {
    /// Scan one entry.
    fn step(&mut self, batch: usize) {
        let Some(record) = self.cursor.current() else {
            self.done = true;
            return;
        };
        if self.matcher.matches(&record.doc) {
            self.matches.push(record.clone());
        }
        self.cursor.advance();
        if !self.cursor.ok() || (self.in_order && self.matches.len() >= batch) {
            self.done = true;
        }
    }
}

/// Race the candidates of a plan set and return the winner's results.
pub fn race(plan_set: &QueryPlanSet, limit: Option<usize>, interrupt: &Interrupt) -> PlanResult<RaceResult> {
    let config = &plan_set.context().config;
    let batch = match limit {
        Some(limit) => config.race_batch_size.min(limit.max(1)),
        None => config.race_batch_size,
    };
    let abandon_after = plan_set
        .cached_plan()
        .map(|cached| config.abandon_threshold(cached.n_scanned()));

    let mut contestants: Vec<Contestant> = plan_set
        .plans()
        .iter()
        .enumerate()
        .map(|(i, plan)| Contestant {
            plan: i,
            cursor: plan.new_cursor(),
            matcher: DocumentMatcher::new(plan.predicate().clone()),
            in_order: !plan.scan_and_order_required(),
            matches: Vec::new(),
            done: false,
        })
        .collect();
    if contestants.is_empty() {
        return Err(PlanError::Internal("plan set has no candidates".to_string()));
    }

    let winner_pos = 'race: loop {
        for (pos, contestant) in contestants.iter_mut().enumerate() {
            interrupt.check()?;
            contestant.step(batch);
            trace!(plan = contestant.plan, scanned = contestant.cursor.n_scanned(), "race step");
            if contestant.done {
                break 'race pos;
            }
            if let Some(threshold) = abandon_after {
                let n_scanned = contestant.cursor.n_scanned();
                if contestant.plan == 0 && n_scanned > threshold {
                    warn!(
                        namespace = plan_set.context().namespace(),
                        n_scanned, threshold, "cached plan abandoned"
                    );
                    return Ok(RaceResult::CachedPlanAbandoned { n_scanned });
                }
            }
        }
    };

    let mut winner = contestants.swap_remove(winner_pos);
    let n_scanned = winner.cursor.n_scanned();
    let plan = plan_set.plan(winner.plan)?;

    while winner.cursor.ok() {
        if winner.in_order && limit.is_some_and(|l| winner.matches.len() >= l) {
            break;
        }
        interrupt.check()?;
        winner.step(usize::MAX);
    }

    let mut records = winner.matches;
    if plan.scan_and_order_required() {
        let sort = &plan_set.request().sort;
        records.sort_by(|a, b| sort.compare_documents(&a.doc, &b.doc));
    }
    if let Some(limit) = limit {
        records.truncate(limit);
    }

    let recorded = plan_set.record_winner(winner.plan, n_scanned)?;
    debug!(
        namespace = plan_set.context().namespace(),
        plan = %plan,
        n_scanned,
        recorded,
        "race won"
    );
    Ok(RaceResult::Finished(RaceOutcome {
        winner: winner.plan,
        n_scanned,
        records,
        recorded,
    }))
}

/// Race, re-planning without the cache if the cached plan is abandoned.
pub fn race_with_replan(
    plan_set: &QueryPlanSet,
    limit: Option<usize>,
    interrupt: &Interrupt,
) -> PlanResult<RaceOutcome> {
    match race(plan_set, limit, interrupt)? {
        RaceResult::Finished(outcome) => Ok(outcome),
        RaceResult::CachedPlanAbandoned { .. } => {
            let fresh = plan_set.replan_ignoring_cache()?;
            match race(&fresh, limit, interrupt)? {
                RaceResult::Finished(outcome) => Ok(outcome),
                RaceResult::CachedPlanAbandoned { .. } => Err(PlanError::Internal(
                    "plan set built without the cache abandoned a cached plan".to_string(),
                )),
            }
        }
    }
}
