//! storage layer
//!
//! In-memory collections of JSON documents, the canonical value order used by
//! index keys, and the cursors the planner hands out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 Collection                   │
//! │  (records in natural order, index metadata)  │
//! └──────────────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐           ┌─────────────┐
//!   │ BasicCursor │           │ BtreeCursor │
//!   │  (natural)  │           │ (index keys)│
//!   └─────────────┘           └─────────────┘
//! ```

mod collection;
mod cursor;
mod error;
pub mod key;
pub mod path;
mod types;

pub use collection::Collection;
pub use cursor::{BasicCursor, BtreeCursor, Cursor};
pub use error::{StorageError, StorageResult};
pub use key::{IndexKey, KeyValue};
pub use types::{CollectionName, InvalidNameError, Record, RecordId};
