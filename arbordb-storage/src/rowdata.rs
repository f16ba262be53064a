//! Packed row format.
//!
//! Record layout, left to right, little-endian throughout:
//!
//! | field           | length(B)        |
//! |-----------------|------------------|
//! | row length      | 4                |
//! | row def id      | 4                |
//! | null map        | ceil(n/8)        |
//! | fixed walk      | data-dependent   |
//! | var data        | data-dependent   |
//! | row length      | 4                |
//!
//! The fixed walk holds one contribution per non-null field in column
//! order: a fixed field's value bytes, or a variable field's
//! prefix-size-wide cumulative end offset (relative to the var data
//! section). NULL fields contribute zero bytes everywhere. The
//! trailing length is a redundant copy enabling backward scans.
//!
//! Each variable field's entry is written at that field's own prefix
//! width, so a long earlier field can push the cumulative offset past
//! a later, narrower field's range even when every value fits its own
//! column. `encode` rejects such rows rather than store an offset the
//! reader cannot recover.
//!
//! This layout is a persistence/interop contract and must stay
//! byte-exact.

use crate::codec;
use crate::error::{Error, Result};
use crate::rowdef::RowDef;
use std::fmt::Write as _;

/// Offset of the leading row length within a record.
pub const O_ROW_LENGTH: usize = 0;
/// Offset of the row definition id within a record.
pub const O_ROW_DEF_ID: usize = 4;
/// Offset of the null map within a record.
pub const O_NULL_MAP: usize = 8;
/// Leading length + row def id + trailing length.
pub const ROW_ENVELOPE_SIZE: usize = 12;

/// One field value handed to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Val<'a> {
    Null,
    Int(i64),
    Bytes(&'a [u8]),
}

impl<'a> From<i64> for Val<'a> {
    #[inline]
    fn from(value: i64) -> Self {
        Val::Int(value)
    }
}

impl<'a> From<&'a str> for Val<'a> {
    #[inline]
    fn from(value: &'a str) -> Self {
        Val::Bytes(value.as_bytes())
    }
}

impl<'a> From<&'a [u8]> for Val<'a> {
    #[inline]
    fn from(value: &'a [u8]) -> Self {
        Val::Bytes(value)
    }
}

/// A reusable view over one encoded row. Not thread-safe: one
/// instance belongs to exactly one in-flight row operation.
#[derive(Debug, Default)]
pub struct RowData {
    buf: Vec<u8>,
    row_start: usize,
    row_end: usize,
}

impl RowData {
    #[inline]
    pub fn new() -> Self {
        RowData::default()
    }

    /// Wraps an externally produced record, validating the envelope.
    pub fn from_bytes(buf: Vec<u8>) -> Result<Self> {
        let row = RowData {
            row_end: buf.len(),
            buf,
            row_start: 0,
        };
        row.check()?;
        Ok(row)
    }

    /// Points this view at another record within the same buffer.
    pub fn reset(&mut self, row_start: usize, row_end: usize) -> Result<()> {
        if row_end > self.buf.len() || row_start > row_end {
            return Err(Error::CorruptRow);
        }
        self.row_start = row_start;
        self.row_end = row_end;
        self.check()
    }

    /// The encoded record bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.buf[self.row_start..self.row_end]
    }

    #[inline]
    pub fn row_size(&self) -> usize {
        self.row_end - self.row_start
    }

    #[inline]
    pub fn row_def_id(&self) -> u32 {
        codec::get_u32(self.bytes(), O_ROW_DEF_ID)
    }

    /// Verifies the envelope invariants: both length copies present,
    /// equal, and covering exactly the record.
    pub fn check(&self) -> Result<()> {
        let size = self.row_size();
        if size < ROW_ENVELOPE_SIZE {
            return Err(Error::CorruptRow);
        }
        let data = self.bytes();
        let leading = codec::get_u32(data, O_ROW_LENGTH) as usize;
        let trailing = codec::get_u32(data, size - 4) as usize;
        if leading != size || trailing != size {
            return Err(Error::CorruptRow);
        }
        Ok(())
    }

    /// Encodes one row for the given table layout, replacing any
    /// previous content of this view.
    pub fn encode(&mut self, def: &RowDef, vals: &[Val]) -> Result<()> {
        let fields = def.fields();
        if vals.len() != fields.len() {
            return Err(Error::ValueCountMismatch);
        }
        let map_len = def.null_map_len();
        // size the record up front.
        let mut walk_len = 0usize;
        let mut var_len = 0usize;
        for (layout, val) in fields.iter().zip(vals) {
            match val {
                Val::Null => {}
                Val::Int(_) => {
                    if !layout.fixed {
                        return Err(Error::FieldTypeMismatch);
                    }
                    walk_len += layout.max_storage_size as usize;
                }
                Val::Bytes(data) => {
                    if layout.fixed {
                        return Err(Error::FieldTypeMismatch);
                    }
                    if data.len() > layout.max_data_len() {
                        return Err(Error::FieldTooNarrow {
                            len: data.len(),
                            width: layout.max_storage_size as usize,
                        });
                    }
                    walk_len += layout.prefix_size;
                    var_len += data.len();
                }
            }
        }
        let size = ROW_ENVELOPE_SIZE + map_len + walk_len + var_len;
        self.buf.clear();
        self.buf.resize(size, 0);
        self.row_start = 0;
        self.row_end = size;
        let buf = &mut self.buf;
        codec::put_u32(buf, O_ROW_LENGTH, size as u32);
        codec::put_u32(buf, O_ROW_DEF_ID, def.row_def_id().value());
        codec::put_u32(buf, size - 4, size as u32);
        // null map, fixed walk and variable data in one pass.
        let mut walk_pos = O_NULL_MAP + map_len;
        let mut var_pos = O_NULL_MAP + map_len + walk_len;
        let mut var_end = 0u64;
        for (layout, val) in fields.iter().zip(vals) {
            match val {
                Val::Null => {
                    buf[O_NULL_MAP + layout.position / 8] |= 1 << (layout.position % 8);
                }
                Val::Int(v) => {
                    let width = layout.max_storage_size as usize;
                    codec::put_int(buf, walk_pos, width, *v)?;
                    walk_pos += width;
                }
                Val::Bytes(data) => {
                    var_end += data.len() as u64;
                    // a cumulative offset beyond the entry's range
                    // would be unreadable; refuse to encode it.
                    if layout.prefix_size < 8 && var_end >= 1u64 << (layout.prefix_size * 8) {
                        return Err(Error::FieldTooNarrow {
                            len: var_end as usize,
                            width: layout.prefix_size,
                        });
                    }
                    codec::put_int(buf, walk_pos, layout.prefix_size, var_end as i64)?;
                    walk_pos += layout.prefix_size;
                    buf[var_pos..var_pos + data.len()].copy_from_slice(data);
                    var_pos += data.len();
                }
            }
        }
        debug_assert_eq!(walk_pos, O_NULL_MAP + map_len + walk_len);
        debug_assert_eq!(var_pos, size - 4);
        Ok(())
    }

    /// Diagnostic rendering: envelope summary, per-field explain and
    /// a hex dump of the record.
    pub fn dump(&self, def: &RowDef) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "row def id={} size={} fields={}",
            self.row_def_id(),
            self.row_size(),
            def.field_count(),
        );
        for (i, layout) in def.fields().iter().enumerate() {
            match self.explain_field(def, i, layout.fixed) {
                Ok(text) => {
                    let _ = writeln!(out, "  c{}: {}", i, text);
                }
                Err(e) => {
                    let _ = writeln!(out, "  c{}: <{}>", i, e);
                }
            }
        }
        out.push_str(&codec::hex_dump(self.bytes(), 0, self.row_size()));
        out
    }

    fn explain_field(&self, def: &RowDef, field: usize, fixed: bool) -> Result<String> {
        if fixed {
            match def.decode_int(self, field)? {
                None => Ok("NULL".to_string()),
                Some(v) => Ok(v.to_string()),
            }
        } else {
            match def.decode_bytes(self, field) {
                None => Ok("NULL".to_string()),
                Some(data) => match std::str::from_utf8(data) {
                    Ok(s) => Ok(format!("{:?}", s)),
                    Err(_) => Ok(format!("{} bytes", data.len())),
                },
            }
        }
    }
}
