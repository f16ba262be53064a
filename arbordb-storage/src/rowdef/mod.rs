pub mod cache;
mod coords;

use crate::codec::{self, Charset};
use crate::error::{Error, Result};
use crate::rowdata::RowData;
use crate::rowdef::coords::{coord_offset, coord_width, FieldCoords, NO_VAR};
use crate::status::TableStatus;
use arbordb_catalog::{Column, TableId};
use semistr::SemiStr;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Static per-column storage facts. Created once when a table's
/// schema is finalized; never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    /// 0-based index within its table.
    pub position: usize,
    pub fixed: bool,
    /// Maximum bytes of storage, including the length prefix for
    /// variable fields.
    pub max_storage_size: u32,
    /// Width of the embedded length prefix, 0 for fixed fields.
    pub prefix_size: usize,
}

impl FieldLayout {
    pub fn from_column(col: &Column) -> Self {
        match col.col_type.fixed_len() {
            Some(n) => FieldLayout {
                position: col.position,
                fixed: true,
                max_storage_size: n as u32,
                prefix_size: 0,
            },
            None => {
                let max_len = col.col_type.max_len();
                // the prefix must exist even for zero-capacity fields.
                let prefix = codec::var_width(max_len).max(1);
                FieldLayout {
                    position: col.position,
                    fixed: false,
                    max_storage_size: (max_len + prefix) as u32,
                    prefix_size: prefix,
                }
            }
        }
    }

    /// Maximum data bytes, excluding the prefix.
    #[inline]
    pub fn max_data_len(&self) -> usize {
        self.max_storage_size as usize - self.prefix_size
    }

    /// Bytes this field contributes to the fixed-walk section of a
    /// row: its value for fixed fields, its end-offset entry for
    /// variable fields.
    #[inline]
    pub(crate) fn walk_width(&self) -> u32 {
        if self.fixed {
            self.max_storage_size
        } else {
            self.prefix_size as u32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDefKind {
    User,
    Group,
}

/// Index layout: ordered field positions plus the storage tree the
/// index lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub index_id: u32,
    pub primary: bool,
    pub fields: Vec<usize>,
    pub tree_name: String,
}

/// Resolved location of one non-null field inside an encoded row.
/// `offset` is relative to the row start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    pub offset: usize,
    pub len: usize,
}

/// Per-table layout descriptor. Immutable after construction and
/// safely shared read-only across threads; a schema change replaces
/// the whole RowDef set, never mutates one in place.
pub struct RowDef {
    row_def_id: TableId,
    kind: RowDefKind,
    schema_name: SemiStr,
    table_name: SemiStr,
    fields: Vec<FieldLayout>,
    tree_name: String,
    charset: Charset,
    auto_increment_field: Option<usize>,
    auto_increment_delta: u64,
    parent_join_fields: SmallVec<[usize; 4]>,
    column_offset: usize,
    hkey_depth: usize,
    indexes: Vec<IndexDef>,
    group_row_def_id: Option<TableId>,
    member_row_def_ids: Vec<TableId>,
    status: Arc<TableStatus>,
    coords: FieldCoords,
}

impl fmt::Debug for RowDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowDef")
            .field("row_def_id", &self.row_def_id)
            .field("kind", &self.kind)
            .field("schema_name", &self.schema_name)
            .field("table_name", &self.table_name)
            .field("field_count", &self.fields.len())
            .field("tree_name", &self.tree_name)
            .finish()
    }
}

impl RowDef {
    #[inline]
    pub fn row_def_id(&self) -> TableId {
        self.row_def_id
    }

    #[inline]
    pub fn kind(&self) -> RowDefKind {
        self.kind
    }

    #[inline]
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    #[inline]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Null-map length in bytes.
    #[inline]
    pub fn null_map_len(&self) -> usize {
        (self.fields.len() + 7) / 8
    }

    #[inline]
    pub fn tree_name(&self) -> &str {
        &self.tree_name
    }

    #[inline]
    pub fn charset(&self) -> Charset {
        self.charset
    }

    #[inline]
    pub fn auto_increment_field(&self) -> Option<usize> {
        self.auto_increment_field
    }

    #[inline]
    pub fn auto_increment_delta(&self) -> u64 {
        self.auto_increment_delta
    }

    /// Child-side positions of the foreign key joining to the parent
    /// row in the same group. Empty for roots and group tables.
    #[inline]
    pub fn parent_join_fields(&self) -> &[usize] {
        &self.parent_join_fields
    }

    /// Position of this table's first column within the enclosing
    /// group table, 0 for group tables themselves.
    #[inline]
    pub fn column_offset(&self) -> usize {
        self.column_offset
    }

    #[inline]
    pub fn hkey_depth(&self) -> usize {
        self.hkey_depth
    }

    #[inline]
    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    #[inline]
    pub fn primary_index(&self) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.primary)
    }

    #[inline]
    pub fn group_row_def_id(&self) -> Option<TableId> {
        self.group_row_def_id
    }

    /// Member user tables in hierarchical order; empty unless this is
    /// a group RowDef.
    #[inline]
    pub fn member_row_def_ids(&self) -> &[TableId] {
        &self.member_row_def_ids
    }

    #[inline]
    pub fn table_status(&self) -> &Arc<TableStatus> {
        &self.status
    }

    /// The table's position within its group's hkey encoding, held by
    /// the table status so it survives restarts.
    #[inline]
    pub fn ordinal(&self) -> u32 {
        self.status.ordinal()
    }

    /// Locates field `field` inside an encoded row, or None if the
    /// field is NULL. O(1) per null-map byte touched.
    pub fn field_location(&self, row: &RowData, field: usize) -> Option<FieldRef> {
        debug_assert!(field < self.fields.len());
        debug_assert_eq!(row.row_def_id(), self.row_def_id.value());
        let data = row.bytes();
        let map_len = self.null_map_len();
        let null_map = &data[8..8 + map_len];
        let byte = field / 8;
        let bit = field % 8;
        // fast path: the null bit is the most selective check.
        if null_map[byte] & (1 << bit) != 0 {
            return None;
        }
        let fixed_start = 8 + map_len;
        // fold in the contribution of every full byte before the
        // target's byte, tracking the last variable-width field seen.
        let mut base = 0u32;
        let mut prev_var: Option<(u32, usize)> = None;
        for b in 0..byte {
            let pattern = (!null_map[b]) as usize;
            let ve = self.coords.var_entry(b, pattern);
            if ve != NO_VAR {
                prev_var = Some((base + coord_offset(ve), coord_width(ve) as usize));
            }
            base += self.coords.byte_total(b, pattern);
        }
        // target byte, masked to the bits at or before the field.
        let mask_incl = ((1u16 << (bit + 1)) - 1) as u8;
        let pattern_incl = ((!null_map[byte]) & mask_incl) as usize;
        let entry = self.coords.entry(byte, pattern_incl);
        let entry_offset = (base + coord_offset(entry)) as usize;
        let entry_width = coord_width(entry) as usize;
        let layout = &self.fields[field];
        if layout.fixed {
            return Some(FieldRef {
                offset: fixed_start + entry_offset,
                len: entry_width,
            });
        }
        // variable field: its entry holds the cumulative end offset;
        // the start is the nearest preceding variable field's end.
        let mask_excl = mask_incl >> 1;
        let ve = self
            .coords
            .var_entry(byte, ((!null_map[byte]) & mask_excl) as usize);
        if ve != NO_VAR {
            prev_var = Some((base + coord_offset(ve), coord_width(ve) as usize));
        }
        // length of the whole fixed-walk section locates the variable
        // data that follows it.
        let mut total = base;
        for b in byte..map_len {
            let n_bits = (self.fields.len() - b * 8).min(8);
            let mask = if n_bits == 8 { 0xff } else { (1u8 << n_bits) - 1 };
            total += self.coords.byte_total(b, ((!null_map[b]) & mask) as usize);
        }
        let var_start = fixed_start + total as usize;
        let end = codec::get_uint(data, fixed_start + entry_offset, entry_width)
            .expect("prefix width validated at build time") as usize;
        let start = match prev_var {
            Some((offset, width)) => codec::get_uint(data, fixed_start + offset as usize, width)
                .expect("prefix width validated at build time")
                as usize,
            None => 0,
        };
        Some(FieldRef {
            offset: var_start + start,
            len: end - start,
        })
    }

    /// Decodes a fixed integer field; None if NULL.
    pub fn decode_int(&self, row: &RowData, field: usize) -> Result<Option<i64>> {
        if !self.fields[field].fixed {
            return Err(Error::FieldTypeMismatch);
        }
        match self.field_location(row, field) {
            None => Ok(None),
            Some(loc) => Ok(Some(codec::get_int(row.bytes(), loc.offset, loc.len)?)),
        }
    }

    /// Raw bytes of a field's data; None if NULL.
    pub fn decode_bytes<'a>(&self, row: &'a RowData, field: usize) -> Option<&'a [u8]> {
        self.field_location(row, field)
            .map(|loc| &row.bytes()[loc.offset..loc.offset + loc.len])
    }

    /// Decodes a variable-width field as a string in the table's
    /// charset; None if NULL.
    pub fn decode_string(&self, row: &RowData, field: usize) -> Result<Option<String>> {
        if self.fields[field].fixed {
            return Err(Error::FieldTypeMismatch);
        }
        match self.decode_bytes(row, field) {
            None => Ok(None),
            Some(data) => Ok(Some(self.charset.decode(data)?)),
        }
    }
}

/// Builds a fully-formed immutable [`RowDef`]; partially-built state
/// never escapes.
pub struct RowDefBuilder {
    row_def_id: TableId,
    kind: RowDefKind,
    schema_name: SemiStr,
    table_name: SemiStr,
    fields: Vec<FieldLayout>,
    tree_name: String,
    charset: Charset,
    auto_increment_field: Option<usize>,
    auto_increment_delta: u64,
    parent_join_fields: SmallVec<[usize; 4]>,
    column_offset: usize,
    hkey_depth: usize,
    indexes: Vec<IndexDef>,
    group_row_def_id: Option<TableId>,
    member_row_def_ids: Vec<TableId>,
}

impl RowDefBuilder {
    pub fn new(row_def_id: TableId, kind: RowDefKind, schema_name: &str, table_name: &str) -> Self {
        RowDefBuilder {
            row_def_id,
            kind,
            schema_name: SemiStr::new(schema_name),
            table_name: SemiStr::new(table_name),
            fields: vec![],
            tree_name: String::new(),
            charset: Charset::Utf8,
            auto_increment_field: None,
            auto_increment_delta: 1,
            parent_join_fields: SmallVec::new(),
            column_offset: 0,
            hkey_depth: 0,
            indexes: vec![],
            group_row_def_id: None,
            member_row_def_ids: vec![],
        }
    }

    pub fn fields(mut self, fields: Vec<FieldLayout>) -> Self {
        self.fields = fields;
        self
    }

    pub fn tree_name(mut self, tree_name: &str) -> Self {
        self.tree_name = tree_name.to_string();
        self
    }

    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn auto_increment(mut self, field: Option<usize>, delta: u64) -> Self {
        self.auto_increment_field = field;
        self.auto_increment_delta = delta;
        self
    }

    pub fn parent_join_fields(mut self, fields: &[usize]) -> Self {
        self.parent_join_fields = SmallVec::from_slice(fields);
        self
    }

    pub fn column_offset(mut self, offset: usize) -> Self {
        self.column_offset = offset;
        self
    }

    pub fn hkey_depth(mut self, depth: usize) -> Self {
        self.hkey_depth = depth;
        self
    }

    pub fn indexes(mut self, indexes: Vec<IndexDef>) -> Self {
        self.indexes = indexes;
        self
    }

    pub fn group_row_def_id(mut self, id: Option<TableId>) -> Self {
        self.group_row_def_id = id;
        self
    }

    pub fn member_row_def_ids(mut self, ids: Vec<TableId>) -> Self {
        self.member_row_def_ids = ids;
        self
    }

    /// Computes the coordinate tables and seals the RowDef.
    pub fn build(self, status: Arc<TableStatus>) -> Arc<RowDef> {
        debug_assert!(self
            .fields
            .iter()
            .enumerate()
            .all(|(i, f)| f.position == i));
        let coords = FieldCoords::build(&self.fields);
        Arc::new(RowDef {
            row_def_id: self.row_def_id,
            kind: self.kind,
            schema_name: self.schema_name,
            table_name: self.table_name,
            fields: self.fields,
            tree_name: self.tree_name,
            charset: self.charset,
            auto_increment_field: self.auto_increment_field,
            auto_increment_delta: self.auto_increment_delta,
            parent_join_fields: self.parent_join_fields,
            column_offset: self.column_offset,
            hkey_depth: self.hkey_depth,
            indexes: self.indexes,
            group_row_def_id: self.group_row_def_id,
            member_row_def_ids: self.member_row_def_ids,
            status,
            coords,
        })
    }
}
