//! In-memory collection: documents in natural order plus index metadata.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;
use ulid::Generator;

use super::error::{StorageError, StorageResult};
use super::types::{CollectionName, Record, RecordId};
use crate::catalog::{CatalogError, CatalogResult, IndexDescriptor, IndexSpec, KeyPattern};

/// A named set of documents and the indexes declared on it.
///
/// Natural order is insertion order. Index entries are derived from the
/// documents on demand by the cursors; only index metadata is kept here.
pub struct Collection {
    name: CollectionName,
    indexes: RwLock<Vec<Arc<IndexDescriptor>>>,
    records: RwLock<Vec<Record>>,
    ids: Mutex<Generator>,
    writes: AtomicU64,
}

impl Collection {
    pub fn new(name: CollectionName) -> Self {
        Self {
            name,
            indexes: RwLock::new(Vec::new()),
            records: RwLock::new(Vec::new()),
            ids: Mutex::new(Generator::new()),
            writes: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &CollectionName {
        &self.name
    }

    /// Snapshot of the declared indexes, in declaration order.
    pub fn indexes(&self) -> Vec<Arc<IndexDescriptor>> {
        self.indexes.read().clone()
    }

    pub fn n_indexes(&self) -> usize {
        self.indexes.read().len()
    }

    /// Index by declaration number.
    pub fn index(&self, idx_no: usize) -> Option<Arc<IndexDescriptor>> {
        self.indexes.read().get(idx_no).cloned()
    }

    pub fn find_index_by_name(&self, name: &str) -> Option<(usize, Arc<IndexDescriptor>)> {
        self.indexes
            .read()
            .iter()
            .enumerate()
            .find(|(_, idx)| idx.name() == name)
            .map(|(i, idx)| (i, idx.clone()))
    }

    pub fn find_index_by_key(&self, key_pattern: &KeyPattern) -> Option<(usize, Arc<IndexDescriptor>)> {
        self.indexes
            .read()
            .iter()
            .enumerate()
            .find(|(_, idx)| idx.key_pattern() == key_pattern)
            .map(|(i, idx)| (i, idx.clone()))
    }

    /// Declare a new index; existing documents set its multikey flag.
    pub fn add_index(&self, spec: &IndexSpec) -> CatalogResult<Arc<IndexDescriptor>> {
        let descriptor = Arc::new(IndexDescriptor::new(spec));
        {
            let records = self.records.read();
            if records
                .iter()
                .any(|r| descriptor.extract_keys(&r.doc).multikey)
            {
                descriptor.mark_multikey();
            }
        }

        let mut indexes = self.indexes.write();
        if indexes
            .iter()
            .any(|idx| idx.name() == descriptor.name() || idx.key_pattern() == descriptor.key_pattern())
        {
            return Err(CatalogError::IndexAlreadyExists(descriptor.name().to_string()));
        }
        indexes.push(descriptor.clone());
        debug!(collection = %self.name, index = descriptor.name(), "index added");
        Ok(descriptor)
    }

    pub fn drop_index(&self, name: &str) -> CatalogResult<()> {
        let mut indexes = self.indexes.write();
        let pos = indexes
            .iter()
            .position(|idx| idx.name() == name)
            .ok_or_else(|| CatalogError::IndexNotFound(name.to_string()))?;
        indexes.remove(pos);
        debug!(collection = %self.name, index = name, "index dropped");
        Ok(())
    }

    /// Store a document and return its identity.
    pub fn insert(&self, doc: Value) -> StorageResult<RecordId> {
        if !doc.is_object() {
            return Err(StorageError::NotADocument(doc.to_string()));
        }

        let id = self
            .ids
            .lock()
            .generate()
            .map(RecordId::new)
            .map_err(|e| StorageError::IdGeneration(e.to_string()))?;

        for index in self.indexes.read().iter() {
            if !index.is_multikey() && index.extract_keys(&doc).multikey {
                debug!(collection = %self.name, index = index.name(), "index became multikey");
                index.mark_multikey();
            }
        }

        self.records.write().push(Record::new(id, doc));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Remove a document by identity; returns whether it existed.
    pub fn remove(&self, id: RecordId) -> bool {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.id != id);
        let removed = records.len() != before;
        if removed {
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.records.read().iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Snapshot of all records in natural order.
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.read().clone()
    }

    /// Writes since the last call to [`Collection::take_writes`].
    pub fn pending_writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Reset the write counter, returning its previous value.
    pub fn take_writes(&self) -> u64 {
        self.writes.swap(0, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("indexes", &self.n_indexes())
            .field("records", &self.len())
            .finish()
    }
}
