//! docplan - query optimizer core for an in-memory document database
//!
//! Given a query predicate, a sort and the indexes of a collection, docplan
//! decides which index to scan. Plans that static analysis cannot rank are
//! raced in round-robin; the winner is remembered per query shape so later
//! queries of the same shape skip the race.
//!
//! # Example
//!
//! ```no_run
//! use docplan::db::Database;
//! use docplan::planner::QueryRequest;
//! use serde_json::json;
//!
//! let db = Database::new();
//! db.ensure_index("shop.orders", &json!({"customer": 1}), false).unwrap();
//! db.insert("shop.orders", json!({"customer": "ann", "total": 12})).unwrap();
//!
//! let request = QueryRequest::parse(&json!({"customer": "ann"})).unwrap();
//! let orders = db.find("shop.orders", &request).unwrap();
//! assert_eq!(orders.len(), 1);
//! ```

#![allow(dead_code)] // Many methods are for public API extensibility

pub mod catalog;
pub mod db;
pub mod planner;
pub mod query;
pub mod ranges;
pub mod storage;
