//! Range analysis of predicates.
//!
//! A predicate's conjunctive part is decomposed into value intervals per
//! field. The planner reads these to classify index candidates, to compute
//! scan bounds, and to fingerprint the query shape for the plan cache.

mod pattern;
mod range;
mod set;
mod vector;

pub use pattern::{PatternKind, QueryPattern};
pub use range::{FieldBound, FieldInterval, FieldRange};
pub use set::{FieldRangeSet, FieldRangeSetPair};
pub use vector::FieldRangeVector;
