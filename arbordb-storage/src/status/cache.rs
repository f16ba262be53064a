//! Versioned table-status cache.
//!
//! All counter mutations flow through [`StatusUpdate`] commands held
//! in a pending log, where redundant work is collapsed before being
//! applied. Consistent persistence snapshots come from copy-on-write
//! versioning (`copy`), not from blocking writers.

use crate::error::{Error, Result};
use crate::status::update::{Fold, StatusUpdate};
use crate::status::{TableStatus, TableStatusRecord};
use crate::tree::TreeExchange;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Name of the dedicated tree the status records persist in.
pub const STATUS_TREE_NAME: &str = "tablestatus";

#[derive(Default)]
pub struct TableStatusCache {
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    tables: HashMap<u32, Arc<TableStatus>>,
    pending: Vec<StatusUpdate>,
    /// Previous version in the copy-on-write chain.
    parent: Option<Arc<TableStatusCache>>,
}

impl TableStatusCache {
    #[inline]
    pub fn new() -> Self {
        TableStatusCache::default()
    }

    #[inline]
    pub fn get(&self, table_id: u32) -> Option<Arc<TableStatus>> {
        self.inner.lock().tables.get(&table_id).cloned()
    }

    /// Statuses are created lazily on first reference to a table id.
    pub fn get_or_create(&self, table_id: u32) -> Arc<TableStatus> {
        let mut inner = self.inner.lock();
        inner
            .tables
            .entry(table_id)
            .or_insert_with(|| Arc::new(TableStatus::new(table_id, now_millis())))
            .clone()
    }

    /// Variant for tables whose row count is storage-derived. A
    /// pre-existing status (reloaded from the tree, which does not
    /// persist computed-ness) is marked computed here.
    pub fn get_or_create_computed(&self, table_id: u32) -> Arc<TableStatus> {
        let status = {
            let mut inner = self.inner.lock();
            inner
                .tables
                .entry(table_id)
                .or_insert_with(|| Arc::new(TableStatus::new_computed(table_id, now_millis())))
                .clone()
        };
        status.mark_computed();
        status
    }

    /// Queues an update, folding it into the most recent pending
    /// update for the same table when possible. Folding never crosses
    /// tables and never reorders a table's own updates.
    pub fn submit(&self, update: StatusUpdate) {
        let mut inner = self.inner.lock();
        let last = inner
            .pending
            .iter()
            .rposition(|u| u.table_id() == update.table_id());
        match last {
            None => inner.pending.push(update),
            Some(i) => match inner.pending[i].fold(&update) {
                Fold::Combined(combined) => inner.pending[i] = combined,
                Fold::Cancelled => {
                    inner.pending.remove(i);
                }
                Fold::Keep => inner.pending.push(update),
            },
        }
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Drains the pending log and applies each update in submission
    /// order.
    pub fn apply_pending(&self) {
        let mut inner = self.inner.lock();
        let pending = std::mem::take(&mut inner.pending);
        for update in pending {
            apply(&mut inner.tables, update);
        }
    }

    /// Copy-on-write snapshot: every status deep-copied, nothing
    /// mutable shared with this version.
    pub fn copy(self: &Arc<Self>) -> Arc<TableStatusCache> {
        let inner = self.inner.lock();
        let tables = inner
            .tables
            .iter()
            .map(|(id, status)| (*id, Arc::new(status.deep_copy())))
            .collect();
        Arc::new(TableStatusCache {
            inner: Mutex::new(CacheInner {
                tables,
                pending: inner.pending.clone(),
                parent: Some(Arc::clone(self)),
            }),
        })
    }

    /// Persists every status still referenced by a live RowDef.
    /// Detached statuses are skipped. Returns the number saved.
    pub fn save(&self, tree: &mut dyn TreeExchange) -> Result<usize> {
        let inner = self.inner.lock();
        tree.remove_all(STATUS_TREE_NAME);
        let mut saved = 0;
        for status in inner.tables.values() {
            if !status.has_row_def() {
                continue;
            }
            let record = status.to_record();
            let value = bincode::serde::encode_to_vec(&record, bincode::config::standard())
                .map_err(|_| Error::StatusSerialization)?;
            tree.put(
                STATUS_TREE_NAME,
                &record.table_id.to_le_bytes(),
                &value,
            );
            saved += 1;
        }
        debug!(saved, "table statuses saved");
        Ok(saved)
    }

    /// Reloads statuses from the backing tree at startup. A table id
    /// appearing twice means the store is corrupt; the load fails
    /// rather than silently overwriting.
    pub fn load(&self, tree: &dyn TreeExchange) -> Result<usize> {
        let mut inner = self.inner.lock();
        let mut seen = HashSet::new();
        let mut loaded = 0;
        let mut cursor: Option<Vec<u8>> = None;
        while let Some((key, value)) = tree.next(STATUS_TREE_NAME, cursor.as_deref()) {
            let (record, _): (TableStatusRecord, usize) =
                bincode::serde::decode_from_slice(&value, bincode::config::standard())
                    .map_err(|_| Error::InvalidStatusRecord)?;
            if !seen.insert(record.table_id) {
                return Err(Error::DuplicateTableStatus(record.table_id));
            }
            inner
                .tables
                .insert(record.table_id, Arc::new(TableStatus::from_record(&record)));
            loaded += 1;
            cursor = Some(key);
        }
        info!(loaded, "table statuses loaded");
        Ok(loaded)
    }

    /// Clears every status's RowDef reference, across the whole
    /// version chain. Called when the schema is being replaced so
    /// stale layout pointers cannot leak into the new generation.
    pub fn detach_schema(&self) {
        let mut next = {
            let inner = self.inner.lock();
            for status in inner.tables.values() {
                status.clear_row_def();
            }
            inner.parent.clone()
        };
        while let Some(cache) = next {
            let inner = cache.inner.lock();
            for status in inner.tables.values() {
                status.clear_row_def();
            }
            next = inner.parent.clone();
        }
    }
}

fn apply(tables: &mut HashMap<u32, Arc<TableStatus>>, update: StatusUpdate) {
    let status = |tables: &mut HashMap<u32, Arc<TableStatus>>, id: u32| {
        tables
            .entry(id)
            .or_insert_with(|| Arc::new(TableStatus::new(id, now_millis())))
            .clone()
    };
    match update {
        StatusUpdate::IncrementRowCount { table_id, delta } => {
            status(tables, table_id).increment_row_count(delta);
        }
        StatusUpdate::DecrementRowCount { table_id, delta } => {
            status(tables, table_id).decrement_row_count(delta);
        }
        StatusUpdate::Truncate { table_id } => {
            status(tables, table_id).truncate();
        }
        StatusUpdate::Drop { table_id } => {
            tables.remove(&table_id);
        }
        StatusUpdate::SetAutoIncrement { table_id, value } => {
            status(tables, table_id).set_auto_increment(value);
        }
        StatusUpdate::SetUniqueId { table_id, value } => {
            status(tables, table_id).set_unique_id(value);
        }
        StatusUpdate::AssignOrdinal { table_id, ordinal } => {
            status(tables, table_id).set_ordinal(ordinal);
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
