//! Cursors over a collection.
//!
//! Cursors take a snapshot when built, so a scan is unaffected by concurrent
//! inserts. `n_scanned` counts every position the cursor has occupied,
//! whether or not the document there matches the query.

use std::collections::HashSet;

use super::collection::Collection;
use super::key::{compare_keys, format_key, IndexKey, KeyValue};
use super::types::{Record, RecordId};
use crate::catalog::IndexDescriptor;

/// Forward-only iteration over records.
pub trait Cursor: Send {
    /// true while the cursor is positioned on a record
    fn ok(&self) -> bool;

    /// Current record, `None` once exhausted.
    fn current(&self) -> Option<&Record>;

    /// Index key at the current position, for index cursors.
    fn current_key(&self) -> Option<&[KeyValue]> {
        None
    }

    /// Move to the next record; returns `ok()` afterwards.
    fn advance(&mut self) -> bool;

    /// Positions visited so far.
    fn n_scanned(&self) -> u64;

    /// Short description such as `BasicCursor` or `BtreeCursor a_1`.
    fn describe(&self) -> String;
}

/// Cursor over records in a fixed order, no index keys.
///
/// Used for natural order scans and by special index plugins that order
/// records themselves.
pub struct BasicCursor {
    records: Vec<Record>,
    pos: usize,
    label: String,
}

impl BasicCursor {
    /// Natural order scan; negative direction scans from the newest record.
    pub fn new(collection: &Collection, direction: i32) -> Self {
        let mut records = collection.snapshot();
        let label = if direction < 0 {
            records.reverse();
            "ReverseCursor"
        } else {
            "BasicCursor"
        };
        Self::over(records, label)
    }

    /// Cursor over records already in scan order.
    pub fn over(records: Vec<Record>, label: impl Into<String>) -> Self {
        Self {
            records,
            pos: 0,
            label: label.into(),
        }
    }
}

impl Cursor for BasicCursor {
    fn ok(&self) -> bool {
        self.pos < self.records.len()
    }

    fn current(&self) -> Option<&Record> {
        self.records.get(self.pos)
    }

    fn advance(&mut self) -> bool {
        if self.ok() {
            self.pos += 1;
        }
        self.ok()
    }

    fn n_scanned(&self) -> u64 {
        (self.pos + usize::from(self.ok())) as u64
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Cursor over index entries inside scan bounds, in index order.
///
/// Entries outside the bounds are never visited. On a multikey index a
/// record is returned once, at its first entry in scan order.
pub struct BtreeCursor {
    entries: Vec<(IndexKey, Record)>,
    pos: usize,
    index_name: String,
    start_key: IndexKey,
    end_key: IndexKey,
}

impl BtreeCursor {
    /// Build a cursor over the keys admitted by `in_bounds`.
    pub fn new(
        collection: &Collection,
        index: &IndexDescriptor,
        direction: i32,
        start_key: IndexKey,
        end_key: IndexKey,
        in_bounds: impl Fn(&[KeyValue]) -> bool,
    ) -> Self {
        let directions = index.key_pattern().directions();
        let mut entries: Vec<(IndexKey, Record)> = Vec::new();
        for record in collection.snapshot() {
            for key in index.extract_keys(&record.doc).keys {
                if in_bounds(&key) {
                    entries.push((key, record.clone()));
                }
            }
        }

        // stable: equal keys keep natural order
        entries.sort_by(|(a, _), (b, _)| compare_keys(a, b, &directions));
        if direction < 0 {
            entries.reverse();
        }

        let mut seen: HashSet<RecordId> = HashSet::new();
        entries.retain(|(_, record)| seen.insert(record.id));

        Self {
            entries,
            pos: 0,
            index_name: index.name().to_string(),
            start_key,
            end_key,
        }
    }

    pub fn start_key(&self) -> &[KeyValue] {
        &self.start_key
    }

    pub fn end_key(&self) -> &[KeyValue] {
        &self.end_key
    }
}

impl Cursor for BtreeCursor {
    fn ok(&self) -> bool {
        self.pos < self.entries.len()
    }

    fn current(&self) -> Option<&Record> {
        self.entries.get(self.pos).map(|(_, r)| r)
    }

    fn current_key(&self) -> Option<&[KeyValue]> {
        self.entries.get(self.pos).map(|(k, _)| k.as_slice())
    }

    fn advance(&mut self) -> bool {
        if self.ok() {
            self.pos += 1;
        }
        self.ok()
    }

    fn n_scanned(&self) -> u64 {
        (self.pos + usize::from(self.ok())) as u64
    }

    fn describe(&self) -> String {
        format!(
            "BtreeCursor {} {}..{}",
            self.index_name,
            format_key(&self.start_key),
            format_key(&self.end_key)
        )
    }
}
