pub mod cache;
pub mod update;

use crate::error::{Error, Result};
use crate::rowdef::RowDef;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};

/// Per-table mutable counters. All accessors lock the owning status;
/// callers must not assume atomicity across multiple calls.
///
/// Created lazily on first reference to a table id, reset (not
/// destroyed) on truncate, removed on drop.
pub struct TableStatus {
    table_id: u32,
    inner: Mutex<StatusInner>,
}

struct StatusInner {
    row_count: u64,
    auto_increment: u64,
    ordinal: u32,
    unique_id: u64,
    creation_time: u64,
    /// Group-table row counts derive from storage and may not be set
    /// directly.
    computed_row_count: bool,
    row_def: Weak<RowDef>,
}

impl TableStatus {
    #[inline]
    pub fn new(table_id: u32, creation_time: u64) -> Self {
        TableStatus {
            table_id,
            inner: Mutex::new(StatusInner {
                row_count: 0,
                auto_increment: 0,
                ordinal: 0,
                unique_id: 0,
                creation_time,
                computed_row_count: false,
                row_def: Weak::new(),
            }),
        }
    }

    /// Status of a table whose row count is derived from storage.
    #[inline]
    pub fn new_computed(table_id: u32, creation_time: u64) -> Self {
        let status = TableStatus::new(table_id, creation_time);
        status.inner.lock().computed_row_count = true;
        status
    }

    pub(crate) fn from_record(record: &TableStatusRecord) -> Self {
        TableStatus {
            table_id: record.table_id,
            inner: Mutex::new(StatusInner {
                row_count: record.row_count,
                auto_increment: record.auto_increment,
                ordinal: record.ordinal,
                unique_id: record.unique_id,
                creation_time: record.creation_time,
                computed_row_count: false,
                row_def: Weak::new(),
            }),
        }
    }

    #[inline]
    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    #[inline]
    pub fn row_count(&self) -> u64 {
        self.inner.lock().row_count
    }

    pub fn set_row_count(&self, value: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.computed_row_count {
            return Err(Error::IllegalRowCountMutation(self.table_id));
        }
        inner.row_count = value;
        Ok(())
    }

    #[inline]
    pub(crate) fn increment_row_count(&self, delta: u64) {
        let mut inner = self.inner.lock();
        inner.row_count += delta;
    }

    #[inline]
    pub(crate) fn decrement_row_count(&self, delta: u64) {
        let mut inner = self.inner.lock();
        inner.row_count = inner.row_count.saturating_sub(delta);
    }

    #[inline]
    pub fn auto_increment(&self) -> u64 {
        self.inner.lock().auto_increment
    }

    /// Monotonic high-water mark: a smaller value never wins.
    #[inline]
    pub fn set_auto_increment(&self, value: u64) {
        let mut inner = self.inner.lock();
        inner.auto_increment = inner.auto_increment.max(value);
    }

    #[inline]
    pub fn ordinal(&self) -> u32 {
        self.inner.lock().ordinal
    }

    #[inline]
    pub fn set_ordinal(&self, ordinal: u32) {
        self.inner.lock().ordinal = ordinal;
    }

    #[inline]
    pub fn unique_id(&self) -> u64 {
        self.inner.lock().unique_id
    }

    /// Monotonic: keeps the maximum of current and given value.
    #[inline]
    pub fn set_unique_id(&self, value: u64) {
        let mut inner = self.inner.lock();
        inner.unique_id = inner.unique_id.max(value);
    }

    /// Allocates the next internally-generated surrogate key.
    #[inline]
    pub fn next_unique_id(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.unique_id += 1;
        inner.unique_id
    }

    #[inline]
    pub fn creation_time(&self) -> u64 {
        self.inner.lock().creation_time
    }

    /// Resets counters; the ordinal is part of the group's key
    /// encoding and survives truncation.
    pub fn truncate(&self) {
        let mut inner = self.inner.lock();
        inner.row_count = 0;
        inner.auto_increment = 0;
        inner.unique_id = 0;
    }

    /// Flags the row count as storage-derived. Computed-ness is not
    /// persisted; it is re-derived whenever the schema is
    /// materialized, so a reloaded status regains the flag here.
    #[inline]
    pub(crate) fn mark_computed(&self) {
        self.inner.lock().computed_row_count = true;
    }

    #[inline]
    pub fn set_row_def(&self, row_def: &Arc<RowDef>) {
        self.inner.lock().row_def = Arc::downgrade(row_def);
    }

    #[inline]
    pub fn clear_row_def(&self) {
        self.inner.lock().row_def = Weak::new();
    }

    /// Whether a RowDef of the current schema generation still refers
    /// to this status.
    #[inline]
    pub fn has_row_def(&self) -> bool {
        self.inner.lock().row_def.strong_count() > 0
    }

    /// Snapshot for copy-on-write versioning: shares nothing mutable
    /// with the source.
    pub(crate) fn deep_copy(&self) -> TableStatus {
        let inner = self.inner.lock();
        TableStatus {
            table_id: self.table_id,
            inner: Mutex::new(StatusInner {
                row_count: inner.row_count,
                auto_increment: inner.auto_increment,
                ordinal: inner.ordinal,
                unique_id: inner.unique_id,
                creation_time: inner.creation_time,
                computed_row_count: inner.computed_row_count,
                row_def: inner.row_def.clone(),
            }),
        }
    }

    pub(crate) fn to_record(&self) -> TableStatusRecord {
        let inner = self.inner.lock();
        TableStatusRecord {
            table_id: self.table_id,
            row_count: inner.row_count,
            auto_increment: inner.auto_increment,
            ordinal: inner.ordinal,
            unique_id: inner.unique_id,
            creation_time: inner.creation_time,
        }
    }
}

/// Persisted form of a table status, keyed by table id in the status
/// tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStatusRecord {
    pub table_id: u32,
    pub row_count: u64,
    pub auto_increment: u64,
    pub ordinal: u32,
    pub unique_id: u64,
    pub creation_time: u64,
}
