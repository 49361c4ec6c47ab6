//! High-level Database API.
//!
//! Owns the collections, the special index plugins and the shared plan
//! cache, and routes queries through the planner.

mod api;

pub use api::{Database, DatabaseConfig, DatabaseError, DatabaseResult, DatabaseStats};
