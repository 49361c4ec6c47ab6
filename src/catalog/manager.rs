//! Catalog manager: the registry of collections.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::error::{CatalogError, CatalogResult};
use crate::storage::{Collection, CollectionName};

/// The catalog maps namespaces to collections.
///
/// Its lock only guards the map. Callers clone the collection handle out and
/// release the lock before planning, so the catalog lock is never held while
/// the plan cache lock is taken.
#[derive(Debug, Default)]
pub struct Catalog {
    collections: RwLock<BTreeMap<CollectionName, Arc<Collection>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new, empty collection.
    pub fn create_collection(&self, name: &str) -> CatalogResult<Arc<Collection>> {
        let name = CollectionName::new(name)?;
        let mut collections = self.collections.write();
        if collections.contains_key(&name) {
            return Err(CatalogError::CollectionAlreadyExists(name.to_string()));
        }
        let collection = Arc::new(Collection::new(name.clone()));
        collections.insert(name.clone(), collection.clone());
        debug!(collection = %name, "collection created");
        Ok(collection)
    }

    /// Get a collection, creating it when missing.
    pub fn get_or_create(&self, name: &str) -> CatalogResult<Arc<Collection>> {
        let name = CollectionName::new(name)?;
        if let Some(existing) = self.collections.read().get(&name) {
            return Ok(existing.clone());
        }
        let mut collections = self.collections.write();
        let collection = collections
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Collection::new(name)))
            .clone();
        Ok(collection)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Collection>> {
        let name = CollectionName::new(name).ok()?;
        self.collections.read().get(&name).cloned()
    }

    pub fn drop_collection(&self, name: &str) -> CatalogResult<()> {
        let name = CollectionName::new(name)?;
        match self.collections.write().remove(&name) {
            Some(_) => {
                debug!(collection = %name, "collection dropped");
                Ok(())
            }
            None => Err(CatalogError::CollectionNotFound(name.to_string())),
        }
    }

    /// Collection names in sorted order.
    pub fn list_collections(&self) -> Vec<String> {
        self.collections
            .read()
            .keys()
            .map(|name| name.to_string())
            .collect()
    }
}
