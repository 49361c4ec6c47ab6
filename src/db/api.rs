//! Database API - high-level interface for docplan.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::catalog::{Catalog, CatalogError, IndexSpec, KeyPattern, SpecialIndexRegistry};
use crate::planner::{
    Interrupt, MultiPlanScanner, PlanCache, PlanCursor, PlanError, PlannerConfig, PlannerContext, QueryPlanSet,
    QueryRequest,
};
use crate::query::QueryError;
use crate::storage::{Collection, RecordId, StorageError};

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DatabaseError {
    /// Errors caused by the caller's input.
    pub fn is_user_error(&self) -> bool {
        match self {
            DatabaseError::Plan(e) => e.is_user_error(),
            DatabaseError::Query(_) | DatabaseError::NamespaceNotFound(_) => true,
            _ => false,
        }
    }
}

/// Database configuration options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Create collections on first insert or index creation.
    pub create_if_missing: bool,
    /// Planner tuning.
    pub planner: PlannerConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            planner: PlannerConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// Parse and validate a JSON configuration; missing fields take defaults.
    pub fn from_json_str(json: &str) -> DatabaseResult<Self> {
        let config: DatabaseConfig =
            serde_json::from_str(json).map_err(|e| DatabaseError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set planner configuration.
    pub fn planner(mut self, value: PlannerConfig) -> Self {
        self.planner = value;
        self
    }

    pub fn validate(&self) -> DatabaseResult<()> {
        self.planner.validate().map_err(DatabaseError::InvalidConfig)
    }
}

/// The main database handle.
///
/// Holds the catalog of collections, the special index plugins and the plan
/// cache shared by every query.
#[derive(Debug)]
pub struct Database {
    config: DatabaseConfig,
    catalog: Catalog,
    specials: Arc<SpecialIndexRegistry>,
    plan_cache: Arc<PlanCache>,
}

impl Default for Database {
    fn default() -> Self {
        Self::from_parts(DatabaseConfig::default(), SpecialIndexRegistry::default())
    }
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database with custom configuration.
    pub fn with_config(config: DatabaseConfig) -> DatabaseResult<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, SpecialIndexRegistry::default()))
    }

    /// Database with a custom set of special index plugins.
    pub fn with_specials(config: DatabaseConfig, specials: SpecialIndexRegistry) -> DatabaseResult<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, specials))
    }

    fn from_parts(config: DatabaseConfig, specials: SpecialIndexRegistry) -> Self {
        Self {
            config,
            catalog: Catalog::new(),
            specials: Arc::new(specials),
            plan_cache: Arc::new(PlanCache::new()),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.plan_cache
    }

    pub fn create_collection(&self, ns: &str) -> DatabaseResult<()> {
        self.catalog.create_collection(ns)?;
        Ok(())
    }

    /// Drop a collection and forget its cached plans.
    pub fn drop_collection(&self, ns: &str) -> DatabaseResult<()> {
        self.catalog.drop_collection(ns)?;
        self.plan_cache.clear_namespace(ns);
        Ok(())
    }

    /// List all collections.
    pub fn collections(&self) -> Vec<String> {
        self.catalog.list_collections()
    }

    pub fn collection(&self, ns: &str) -> Option<Arc<Collection>> {
        self.catalog.get(ns)
    }

    fn writable_collection(&self, ns: &str) -> DatabaseResult<Arc<Collection>> {
        if self.config.create_if_missing {
            Ok(self.catalog.get_or_create(ns)?)
        } else {
            self.catalog
                .get(ns)
                .ok_or_else(|| DatabaseError::NamespaceNotFound(ns.to_string()))
        }
    }

    /// Create an index from a key pattern such as `{a: 1, b: -1}`; returns
    /// its name.
    pub fn ensure_index(&self, ns: &str, key: &Value, sparse: bool) -> DatabaseResult<String> {
        let spec = IndexSpec::new(KeyPattern::from_json(key)?).sparse(sparse);
        self.create_index(ns, spec)
    }

    pub fn create_index(&self, ns: &str, spec: IndexSpec) -> DatabaseResult<String> {
        if let Some(kind) = spec.key_pattern.special_kind() {
            if !self.specials.contains(kind) {
                return Err(CatalogError::UnknownSpecialIndex(kind.to_string()).into());
            }
        }
        let collection = self.writable_collection(ns)?;
        let index = collection.add_index(&spec)?;
        self.plan_cache.clear_namespace(ns);
        Ok(index.name().to_string())
    }

    pub fn drop_index(&self, ns: &str, name: &str) -> DatabaseResult<()> {
        let collection = self.existing(ns)?;
        collection.drop_index(name)?;
        self.plan_cache.clear_namespace(ns);
        Ok(())
    }

    /// Insert a document. Once enough writes accumulate on a namespace its
    /// cached plans are dropped.
    pub fn insert(&self, ns: &str, doc: Value) -> DatabaseResult<RecordId> {
        let collection = self.writable_collection(ns)?;
        let id = collection.insert(doc)?;
        self.note_write(ns, &collection);
        Ok(id)
    }

    pub fn remove(&self, ns: &str, id: RecordId) -> DatabaseResult<()> {
        let collection = self.existing(ns)?;
        if !collection.remove(id) {
            return Err(StorageError::RecordNotFound(id.to_string()).into());
        }
        self.note_write(ns, &collection);
        Ok(())
    }

    fn note_write(&self, ns: &str, collection: &Collection) {
        let threshold = self.config.planner.cache_write_threshold;
        if threshold > 0 && collection.pending_writes() >= threshold {
            let writes = collection.take_writes();
            let dropped = self.plan_cache.clear_namespace(ns);
            debug!(namespace = ns, writes, dropped, "write threshold reached");
        }
    }

    fn existing(&self, ns: &str) -> DatabaseResult<Arc<Collection>> {
        self.catalog
            .get(ns)
            .ok_or_else(|| DatabaseError::NamespaceNotFound(ns.to_string()))
    }

    /// Planning context for a namespace; the catalog lock is released
    /// before this returns.
    pub fn planner_context(&self, ns: &str) -> DatabaseResult<PlannerContext> {
        Ok(PlannerContext {
            collection: self.existing(ns)?,
            cache: self.plan_cache.clone(),
            specials: self.specials.clone(),
            config: self.config.planner.clone(),
        })
    }

    pub fn query_plan_set(&self, ns: &str, request: &QueryRequest) -> DatabaseResult<QueryPlanSet> {
        let context = self.planner_context(ns)?;
        Ok(QueryPlanSet::for_request(&context, request)?)
    }

    pub fn multi_plan_scanner(&self, ns: &str, request: &QueryRequest) -> DatabaseResult<MultiPlanScanner> {
        let context = self.planner_context(ns)?;
        Ok(MultiPlanScanner::make(&context, request)?)
    }

    /// Cursor on the statically best plan, without racing.
    pub fn best_guess_cursor(&self, ns: &str, request: &QueryRequest) -> DatabaseResult<PlanCursor> {
        Ok(self.multi_plan_scanner(ns, request)?.best_guess_cursor()?)
    }

    /// Run a query. A missing namespace yields no documents.
    pub fn find(&self, ns: &str, request: &QueryRequest) -> DatabaseResult<Vec<Value>> {
        self.find_with_interrupt(ns, request, &Interrupt::new())
    }

    pub fn find_with_interrupt(
        &self,
        ns: &str,
        request: &QueryRequest,
        interrupt: &Interrupt,
    ) -> DatabaseResult<Vec<Value>> {
        let Some(collection) = self.catalog.get(ns) else {
            return Ok(Vec::new());
        };
        let context = PlannerContext {
            collection,
            cache: self.plan_cache.clone(),
            specials: self.specials.clone(),
            config: self.config.planner.clone(),
        };
        let scanner = MultiPlanScanner::make(&context, request)?;
        let records = scanner.run(interrupt, request.limit)?;
        Ok(records
            .into_iter()
            .map(|record| match &request.projection {
                Some(projection) => projection.apply(&record.doc),
                None => record.doc.as_ref().clone(),
            })
            .collect())
    }

    /// Describe the plans a query would consider.
    pub fn explain(&self, ns: &str, request: &QueryRequest) -> DatabaseResult<String> {
        Ok(self.multi_plan_scanner(ns, request)?.to_string())
    }

    /// Get database statistics.
    pub fn stats(&self) -> DatabaseStats {
        let names = self.catalog.list_collections();
        let documents = names
            .iter()
            .filter_map(|ns| self.catalog.get(ns))
            .map(|c| c.len())
            .sum();
        let cached_plans = names.iter().map(|ns| self.plan_cache.len(ns)).sum();
        DatabaseStats {
            collections: names.len(),
            documents,
            cached_plans,
        }
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Number of collections.
    pub collections: usize,
    /// Documents across all collections.
    pub documents: usize,
    /// Plan cache entries across all collections.
    pub cached_plans: usize,
}
