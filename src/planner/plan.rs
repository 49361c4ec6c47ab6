//! A single candidate plan: one index, or natural order, judged against a
//! query.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::cache::PlanKey;
use super::error::{PlanError, PlanResult};
use super::plan_set::PlannerContext;
use super::request::QueryRequest;
use crate::catalog::{IndexDescriptor, KeyPattern, SpecialIndexPlugin};
use crate::query::{DocumentMatcher, Matcher, Predicate, Projection, SortSpec};
use crate::ranges::{FieldRangeSet, FieldRangeSetPair, FieldRangeVector};
use crate::storage::key::{compare_keys, format_key};
use crate::storage::path::set_path;
use crate::storage::{BasicCursor, BtreeCursor, Collection, Cursor, IndexKey, KeyValue, Record};

/// How useful a plan is for its query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Utility {
    /// Would return wrong results (sparse index, missing fields may match).
    Disallowed,
    /// No document can match.
    Impossible,
    /// Bounds and order cover the whole query; no other plan needs to run.
    Optimal,
    Helpful,
    /// Neither narrows the scan nor provides the sort.
    Unhelpful,
}

impl fmt::Display for Utility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Utility::Disallowed => "Disallowed",
            Utility::Impossible => "Impossible",
            Utility::Optimal => "Optimal",
            Utility::Helpful => "Helpful",
            Utility::Unhelpful => "Unhelpful",
        };
        f.write_str(name)
    }
}

/// Index a plan is built over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexChoice {
    Natural,
    /// Position in the collection's index list.
    Index(usize),
}

/// Key range an index plan scans.
#[derive(Debug, Clone, PartialEq)]
enum ScanBounds {
    Ranges(FieldRangeVector),
    /// Explicit `min` (inclusive) and `max` (exclusive), both in index order.
    Explicit { min: IndexKey, max: IndexKey },
}

/// Builds projected documents straight from index keys.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFieldsOnly {
    /// Index field paths, flagged when the projection keeps them.
    fields: Vec<(String, bool)>,
}

impl KeyFieldsOnly {
    fn for_index(projection: Option<&Projection>, key: &KeyPattern, multikey: bool) -> Option<Self> {
        let projection = projection?;
        if !projection.is_inclusion() || multikey || key.special_kind().is_some() {
            return None;
        }
        if !projection.fields().iter().all(|f| key.contains_field(f)) {
            return None;
        }
        if projection.includes_id() && !key.contains_field("_id") {
            return None;
        }
        let fields = key
            .fields()
            .iter()
            .map(|f| {
                let keep = if f.path == "_id" {
                    projection.includes_id()
                } else {
                    projection.fields().iter().any(|p| *p == f.path)
                };
                (f.path.clone(), keep)
            })
            .collect();
        Some(Self { fields })
    }

    /// The projected document for an index key.
    pub fn hydrate(&self, key: &[KeyValue]) -> Value {
        let mut doc = Value::Object(Map::new());
        for ((path, keep), component) in self.fields.iter().zip(key.iter()) {
            if *keep {
                let value = component.as_value().cloned().unwrap_or(Value::Null);
                set_path(&mut doc, path, value);
            }
        }
        doc
    }
}

/// A candidate plan. Everything is computed at construction and never
/// changes afterwards.
pub struct QueryPlan {
    collection: Arc<Collection>,
    index: Option<(usize, Arc<IndexDescriptor>)>,
    ranges: Arc<FieldRangeSetPair>,
    original_ranges: Arc<FieldRangeSetPair>,
    predicate: Arc<Predicate>,
    sort: SortSpec,
    special: Option<Arc<dyn SpecialIndexPlugin>>,
    multikey: bool,
    utility: Utility,
    scan_and_order_required: bool,
    direction: i32,
    exact_key_match: bool,
    key_fields_only: Option<KeyFieldsOnly>,
    finite_set_order_suffix: bool,
    bounds: Option<ScanBounds>,
}

impl QueryPlan {
    /// Judge one index (or natural order) for a request.
    ///
    /// `ranges` are exact for the request's predicate; `original_ranges` are
    /// the relaxed ranges the cache pattern is built from. Fails only on an
    /// index number out of range.
    pub fn make(
        context: &PlannerContext,
        choice: IndexChoice,
        ranges: &Arc<FieldRangeSetPair>,
        original_ranges: &Arc<FieldRangeSetPair>,
        request: &QueryRequest,
    ) -> PlanResult<Self> {
        let collection = context.collection.clone();
        let index = match choice {
            IndexChoice::Natural => None,
            IndexChoice::Index(idx_no) => {
                let descriptor = collection.index(idx_no).ok_or(PlanError::InvalidIndexNumber {
                    index: idx_no,
                    count: collection.n_indexes(),
                })?;
                Some((idx_no, descriptor))
            }
        };

        let mut plan = Self {
            collection,
            index: index.clone(),
            ranges: ranges.clone(),
            original_ranges: original_ranges.clone(),
            predicate: request.predicate.clone(),
            sort: request.sort.clone(),
            special: None,
            multikey: false,
            utility: Utility::Helpful,
            scan_and_order_required: false,
            direction: 0,
            exact_key_match: false,
            key_fields_only: None,
            finite_set_order_suffix: false,
            bounds: None,
        };

        match index {
            None => plan.init_natural(),
            Some((_, descriptor)) => match descriptor.special_kind() {
                Some(kind) => {
                    let plugin = context.specials.get(kind).ok_or_else(|| {
                        PlanError::Internal(format!("no plugin registered for index kind {}", kind))
                    })?;
                    plan.init_special(&descriptor, plugin);
                }
                None => plan.init_btree(&descriptor, request),
            },
        }
        Ok(plan)
    }

    fn init_natural(&mut self) {
        self.utility = if self.ranges.match_possible() {
            Utility::Helpful
        } else {
            Utility::Impossible
        };
        self.scan_and_order_required = !self.sort.fields().is_empty();
        self.direction = if self.scan_and_order_required {
            0
        } else {
            self.sort.natural_direction().unwrap_or(1)
        };
    }

    fn init_special(&mut self, index: &IndexDescriptor, plugin: Arc<dyn SpecialIndexPlugin>) {
        self.multikey = index.is_multikey();
        self.scan_and_order_required = plugin.scan_and_order_required(index, &self.predicate, &self.sort);
        self.utility = if index.is_sparse() && self.predicate.may_match_missing_field() {
            Utility::Disallowed
        } else {
            Utility::Helpful
        };
        self.special = Some(plugin);
    }

    fn init_btree(&mut self, index: &IndexDescriptor, request: &QueryRequest) {
        let multikey = index.is_multikey();
        let ranges = self.ranges.clone();
        let frs = ranges.for_index(multikey);
        let key = index.key_pattern();
        let sort = &self.sort;

        let (scan_and_order, direction) = order_analysis(frs, key, sort);

        let mut optimal_count: i64 = 0;
        let mut awaiting_last_optimal_field = true;
        let mut exact_indexed = 0;
        let mut unindexed_sort: HashSet<&str> = sort.fields().iter().map(|f| f.path.as_str()).collect();
        for field in key.fields() {
            let range = frs.range(&field.path);
            if awaiting_last_optimal_field {
                if !range.is_universal() {
                    optimal_count += 1;
                }
                if !range.is_equality() {
                    awaiting_last_optimal_field = false;
                }
            } else if !range.is_universal() {
                optimal_count = -1;
            }
            if range.is_equality() && range.max().is_some_and(is_exact_key_value) {
                exact_indexed += 1;
            }
            unindexed_sort.remove(field.path.as_str());
        }

        let non_universal = frs.num_non_universal_ranges();
        let impossible = !frs.match_possible_for_index(key);
        let unhelpful =
            (scan_and_order || sort.fields().is_empty()) && frs.range(&key.first_field().path).is_universal();
        // A sparse index holds only documents with some indexed field, so a
        // usable plan needs the predicate to require one of them.
        let disallowed = index.is_sparse()
            && (self.predicate.may_match_missing_field()
                || (!impossible
                    && !unhelpful
                    && !key.fields().iter().any(|f| self.predicate.requires_field(&f.path))));
        let optimal = !scan_and_order && optimal_count == non_universal as i64;

        self.utility = if disallowed {
            Utility::Disallowed
        } else if impossible {
            Utility::Impossible
        } else if unhelpful {
            Utility::Unhelpful
        } else if optimal {
            Utility::Optimal
        } else {
            Utility::Helpful
        };

        self.multikey = multikey;
        self.scan_and_order_required = scan_and_order;
        self.direction = direction;
        self.exact_key_match = exact_indexed == non_universal
            && exact_indexed == key.len()
            && unindexed_sort.is_empty()
            && self.predicate.is_simple_equality();
        self.key_fields_only = KeyFieldsOnly::for_index(request.projection.as_ref(), key, multikey);
        self.finite_set_order_suffix = finite_set_order_suffix(frs, key, sort);
        self.bounds = Some(if request.has_min_max() {
            explicit_bounds(key, request.min.as_ref(), request.max.as_ref())
        } else {
            ScanBounds::Ranges(FieldRangeVector::new(frs, key, direction))
        });
    }

    pub fn utility(&self) -> Utility {
        self.utility
    }

    pub fn scan_and_order_required(&self) -> bool {
        self.scan_and_order_required
    }

    /// +1 forward, -1 reverse, 0 when results are sorted afterwards.
    pub fn direction(&self) -> i32 {
        self.direction
    }

    pub fn exact_key_match(&self) -> bool {
        self.exact_key_match
    }

    pub fn key_fields_only(&self) -> Option<&KeyFieldsOnly> {
        self.key_fields_only.as_ref()
    }

    /// True when the query pins an index prefix to finite point sets and the
    /// requested order continues the index from there.
    pub fn query_finite_set_order_suffix(&self) -> bool {
        self.finite_set_order_suffix
    }

    pub fn is_natural(&self) -> bool {
        self.index.is_none()
    }

    /// Special index kind for plugin plans.
    pub fn special(&self) -> Option<&'static str> {
        self.special.as_ref().map(|p| p.kind())
    }

    pub fn is_special(&self) -> bool {
        self.special.is_some()
    }

    /// Position of the index in the collection, `None` for natural order.
    pub fn idx_no(&self) -> Option<usize> {
        self.index.as_ref().map(|(idx_no, _)| *idx_no)
    }

    pub fn index(&self) -> Option<&IndexDescriptor> {
        self.index.as_ref().map(|(_, d)| d.as_ref())
    }

    pub fn index_name(&self) -> Option<&str> {
        self.index().map(IndexDescriptor::name)
    }

    /// Cache identity of the plan's index.
    pub fn plan_key(&self) -> PlanKey {
        match self.index() {
            Some(index) => PlanKey::Index(index.key_pattern().clone()),
            None => PlanKey::Natural,
        }
    }

    /// Whether the index was multikey when the plan was built.
    pub fn is_multikey(&self) -> bool {
        self.multikey
    }

    pub fn ranges(&self) -> &FieldRangeSetPair {
        &self.ranges
    }

    pub fn original_ranges(&self) -> &FieldRangeSetPair {
        &self.original_ranges
    }

    pub fn predicate(&self) -> &Arc<Predicate> {
        &self.predicate
    }

    pub fn sort(&self) -> &SortSpec {
        &self.sort
    }

    /// First key an index scan visits; `None` for natural and special plans.
    pub fn start_key(&self) -> Option<IndexKey> {
        match self.bounds.as_ref()? {
            ScanBounds::Ranges(vector) => Some(vector.start_key()),
            ScanBounds::Explicit { min, max } => Some(if self.direction < 0 { max.clone() } else { min.clone() }),
        }
    }

    /// Last key an index scan visits; `None` for natural and special plans.
    pub fn end_key(&self) -> Option<IndexKey> {
        match self.bounds.as_ref()? {
            ScanBounds::Ranges(vector) => Some(vector.end_key()),
            ScanBounds::Explicit { min, max } => Some(if self.direction < 0 { min.clone() } else { max.clone() }),
        }
    }

    /// A fresh cursor positioned at the first candidate.
    pub fn new_cursor(&self) -> Box<dyn Cursor> {
        let scan_direction = if self.direction < 0 { -1 } else { 1 };
        let Some((_, index)) = &self.index else {
            if self.utility == Utility::Impossible {
                return Box::new(BasicCursor::over(Vec::new(), "BasicCursor"));
            }
            return Box::new(BasicCursor::new(&self.collection, scan_direction));
        };
        if let Some(plugin) = &self.special {
            return plugin.new_cursor(&self.collection, index, &self.predicate);
        }
        match &self.bounds {
            Some(ScanBounds::Explicit { min, max }) => {
                let directions = index.key_pattern().directions();
                let (lower, upper) = (min.clone(), max.clone());
                let (start, end) = if scan_direction < 0 {
                    (max.clone(), min.clone())
                } else {
                    (min.clone(), max.clone())
                };
                Box::new(BtreeCursor::new(&self.collection, index, scan_direction, start, end, move |key| {
                    compare_keys(key, &lower, &directions).is_ge() && compare_keys(key, &upper, &directions).is_lt()
                }))
            }
            Some(ScanBounds::Ranges(vector)) => {
                let admits = vector.clone();
                Box::new(BtreeCursor::new(
                    &self.collection,
                    index,
                    scan_direction,
                    vector.start_key(),
                    vector.end_key(),
                    move |key| admits.matches_key(key),
                ))
            }
            None => Box::new(BasicCursor::new(&self.collection, scan_direction)),
        }
    }

    /// Cursor paired with this plan's matcher.
    pub fn plan_cursor(&self) -> PlanCursor {
        PlanCursor::new(self.new_cursor(), DocumentMatcher::new(self.predicate.clone()))
    }
}

impl fmt::Debug for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPlan")
            .field("index", &self.index_name())
            .field("special", &self.special())
            .field("utility", &self.utility)
            .field("scan_and_order_required", &self.scan_and_order_required)
            .field("direction", &self.direction)
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.index(), self.special()) {
            (None, _) => write!(f, "$natural")?,
            (Some(index), Some(kind)) => write!(f, "{} ({})", index.name(), kind)?,
            (Some(index), None) => write!(f, "{}", index.name())?,
        }
        write!(
            f,
            " utility: {} scanAndOrder: {} direction: {}",
            self.utility, self.scan_and_order_required, self.direction
        )?;
        if let (Some(start), Some(end)) = (self.start_key(), self.end_key()) {
            write!(f, " bounds: {}..{}", format_key(&start), format_key(&end))?;
        }
        Ok(())
    }
}

/// Plan cursor with its matcher attached.
pub struct PlanCursor {
    cursor: Box<dyn Cursor>,
    matcher: DocumentMatcher,
}

impl PlanCursor {
    pub fn new(cursor: Box<dyn Cursor>, matcher: DocumentMatcher) -> Self {
        Self { cursor, matcher }
    }

    /// Whether the current document satisfies the query.
    pub fn current_matches(&self) -> bool {
        self.cursor
            .current()
            .is_some_and(|record| self.matcher.matches(&record.doc))
    }
}

impl Cursor for PlanCursor {
    fn ok(&self) -> bool {
        self.cursor.ok()
    }

    fn current(&self) -> Option<&Record> {
        self.cursor.current()
    }

    fn current_key(&self) -> Option<&[KeyValue]> {
        self.cursor.current_key()
    }

    fn advance(&mut self) -> bool {
        self.cursor.advance()
    }

    fn n_scanned(&self) -> u64 {
        self.cursor.n_scanned()
    }

    fn describe(&self) -> String {
        self.cursor.describe()
    }
}

/// Walk sort fields against the index. Returns (scan_and_order_required,
/// direction).
fn order_analysis(frs: &FieldRangeSet, key: &KeyPattern, sort: &SortSpec) -> (bool, i32) {
    let sort_fields = sort.fields();
    if sort_fields.is_empty() {
        return (false, 0);
    }
    let key_fields = key.fields();
    let mut direction = 0;
    let mut k = 0;
    let mut matched = 0;

    'sort: for sort_field in sort_fields {
        while let Some(key_field) = key_fields.get(k) {
            k += 1;
            if key_field.path == sort_field.path {
                if key_field.is_special() {
                    break 'sort;
                }
                let d = if (sort_field.direction > 0) == (key_field.direction() > 0) { 1 } else { -1 };
                if direction == 0 {
                    direction = d;
                } else if direction != d {
                    break 'sort;
                }
                matched += 1;
                continue 'sort;
            }
            if !frs.range(&key_field.path).is_equality() {
                break 'sort;
            }
        }
        break;
    }

    if matched == sort_fields.len() {
        (false, direction)
    } else {
        (true, 0)
    }
}

fn finite_set_order_suffix(frs: &FieldRangeSet, key: &KeyPattern, sort: &SortSpec) -> bool {
    if !frs.match_possible() {
        return true;
    }
    let key_fields = key.fields();
    let mut sort_fields = sort.fields().iter().peekable();
    let mut idx = 0;
    let mut covered = 0;

    while let Some(key_field) = key_fields.get(idx) {
        let range = frs.range(&key_field.path);
        if range.is_universal() || !range.is_point_set() {
            break;
        }
        covered += 1;
        if sort_fields.peek().is_some_and(|s| s.path == key_field.path) {
            sort_fields.next();
        }
        idx += 1;
    }
    if covered != frs.num_non_universal_ranges() {
        return false;
    }

    while let Some(sort_field) = sort_fields.peek() {
        let Some(key_field) = key_fields.get(idx) else {
            return false;
        };
        if key_field.path != sort_field.path || key_field.is_special() {
            return false;
        }
        if (key_field.direction() > 0) != (sort_field.direction > 0) {
            return false;
        }
        sort_fields.next();
        idx += 1;
    }
    true
}

/// Values whose index key identifies them exactly.
fn is_exact_key_value(value: &KeyValue) -> bool {
    matches!(
        value.as_value(),
        Some(Value::String(_) | Value::Bool(_) | Value::Null)
    )
}

fn explicit_bounds(key: &KeyPattern, min: Option<&Value>, max: Option<&Value>) -> ScanBounds {
    let component = |bound: Option<&Value>, path: &str, lowest: bool, ascending: bool| {
        match bound.and_then(|b| b.get(path)) {
            Some(value) => KeyValue::Value(value.clone()),
            None if lowest == ascending => KeyValue::MinKey,
            None => KeyValue::MaxKey,
        }
    };
    let min = key
        .fields()
        .iter()
        .map(|f| component(min, &f.path, true, f.direction() > 0))
        .collect();
    let max = key
        .fields()
        .iter()
        .map(|f| component(max, &f.path, false, f.direction() > 0))
        .collect();
    ScanBounds::Explicit { min, max }
}
