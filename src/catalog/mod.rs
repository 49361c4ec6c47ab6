//! Catalog module for collections and their indexes.
//!
//! The catalog owns the namespace registry, index key patterns and index
//! descriptors, and the registry of special index plugins. The planner only
//! reads from it.

mod error;
mod index;
mod manager;
mod special;
mod types;

pub use error::{CatalogError, CatalogResult};
pub use index::{ExtractedKeys, IndexDescriptor, IndexSpec};
pub use manager::Catalog;
pub use special::{GeoIndexPlugin, SpecialIndexPlugin, SpecialIndexRegistry, Suitability};
pub use types::{KeyField, KeyKind, KeyPattern};
