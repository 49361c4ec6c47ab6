//! Query documents: predicates, sort specs, projections and the matcher.
//!
//! Queries arrive as JSON documents. They are parsed once into typed
//! structures that the range analysis and the planner work from.

mod ast;
mod error;
mod matcher;
mod parser;
mod projection;
mod sort;

pub use ast::{as_point, distance, Condition, GeoShape, Predicate, RegexPattern};
pub use error::{QueryError, QueryResult};
pub use matcher::{DocumentMatcher, Matcher};
pub use parser::parse_predicate;
pub use projection::{Projection, ProjectionMode};
pub use sort::{SortField, SortSpec};
