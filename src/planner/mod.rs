//! Query planning and optimization.
//!
//! For a query this module decides which index, if any, to scan. Each index
//! is judged statically by a [`QueryPlan`]; a [`QueryPlanSet`] keeps the
//! candidates worth trying and consults the [`PlanCache`]; candidates that
//! static analysis cannot separate are raced, and the winner is recorded per
//! query shape. A [`MultiPlanScanner`] plans the branches of a top level
//! `$or` separately.
//!
//! ```text
//! predicate + sort + hint
//!          │
//!          ▼
//!  FieldRangeSetPair ──► QueryPlanSet ◄──► PlanCache
//!                            │
//!                            ▼
//!                     race (round-robin) ──► record winner
//! ```

mod cache;
mod config;
mod error;
mod plan;
mod plan_set;
mod race;
mod request;
mod scanner;

pub use cache::{CachedQueryPlan, CandidatePlanCharacter, PlanCache, PlanKey};
pub use config::PlannerConfig;
pub use error::{PlanError, PlanResult};
pub use plan::{IndexChoice, KeyFieldsOnly, PlanCursor, QueryPlan, Utility};
pub use plan_set::{PlannerContext, QueryPlanSet};
pub use race::{race, race_with_replan, Interrupt, RaceOutcome, RaceResult};
pub use request::{CachePolicy, Hint, QueryRequest};
pub use scanner::MultiPlanScanner;
