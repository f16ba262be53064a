//! Precomputed field-coordinate tables.
//!
//! Because NULL fields contribute no bytes, the offset of field i in a
//! packed row depends on which of fields 0..i are null. The tables
//! here memoize that arithmetic per null-map byte: one 256-entry array
//! per byte, indexed by the complemented (and masked) null-map byte
//! value, so locating a field costs O(1) per null-map byte touched
//! instead of a per-field scan.
//!
//! Entry packing: `(walk_width << 24) | cumulative_offset`, where the
//! offset accumulates the walk widths of the set fields before the
//! last set bit, and the width is the last set field's own walk width.
//! A field's walk width is its storage size if fixed, or the width of
//! its end-offset entry if variable.

use crate::rowdef::FieldLayout;

/// Sentinel for "no variable-width field among the set bits".
pub(crate) const NO_VAR: u32 = u32::MAX;

#[inline]
pub(crate) const fn coord_offset(entry: u32) -> u32 {
    entry & 0xFF_FFFF
}

#[inline]
pub(crate) const fn coord_width(entry: u32) -> u32 {
    entry >> 24
}

#[inline]
const fn pack(width: u32, offset: u32) -> u32 {
    (width << 24) | offset
}

pub(crate) struct FieldCoords {
    /// One table per null-map byte, indexed by the 8-bit non-null
    /// pattern of that byte's fields.
    coords: Vec<[u32; 256]>,
    /// Parallel tables resolving the last variable-width field among
    /// the pattern's set bits, or NO_VAR.
    var_coords: Vec<[u32; 256]>,
}

impl FieldCoords {
    /// Builds both tables by recursive doubling: entry `k | bit` is
    /// derived from entry `k` by advancing past `k`'s last field.
    /// Runs once per RowDef build, never per row.
    pub(crate) fn build(fields: &[FieldLayout]) -> Self {
        let n_bytes = (fields.len() + 7) / 8;
        let mut coords = vec![[0u32; 256]; n_bytes];
        let mut var_coords = vec![[NO_VAR; 256]; n_bytes];
        for b in 0..n_bytes {
            let n_bits = (fields.len() - b * 8).min(8);
            for j in 0..n_bits {
                let field = &fields[b * 8 + j];
                let width = field.walk_width();
                let bit = 1usize << j;
                for k in 0..bit {
                    let prev = coords[b][k];
                    let entry = pack(width, coord_offset(prev) + coord_width(prev));
                    coords[b][k | bit] = entry;
                    var_coords[b][k | bit] = if field.fixed {
                        var_coords[b][k]
                    } else {
                        entry
                    };
                }
            }
        }
        FieldCoords { coords, var_coords }
    }

    #[inline]
    pub(crate) fn entry(&self, byte: usize, pattern: usize) -> u32 {
        self.coords[byte][pattern]
    }

    #[inline]
    pub(crate) fn var_entry(&self, byte: usize, pattern: usize) -> u32 {
        self.var_coords[byte][pattern]
    }

    /// Total walk width contributed by one byte's pattern.
    #[inline]
    pub(crate) fn byte_total(&self, byte: usize, pattern: usize) -> u32 {
        let e = self.coords[byte][pattern];
        coord_offset(e) + coord_width(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(position: usize, size: u32) -> FieldLayout {
        FieldLayout {
            position,
            fixed: true,
            max_storage_size: size,
            prefix_size: 0,
        }
    }

    fn var(position: usize, max_len: u32, prefix: usize) -> FieldLayout {
        FieldLayout {
            position,
            fixed: false,
            max_storage_size: max_len + prefix as u32,
            prefix_size: prefix,
        }
    }

    #[test]
    fn test_coords_all_fixed() {
        let fields = vec![fixed(0, 4), fixed(1, 4), fixed(2, 4)];
        let coords = FieldCoords::build(&fields);
        // all three non-null: last field at offset 8, width 4.
        let e = coords.entry(0, 0b111);
        assert_eq!(coord_offset(e), 8);
        assert_eq!(coord_width(e), 4);
        // field 1 null: field 2 sits right after field 0.
        let e = coords.entry(0, 0b101);
        assert_eq!(coord_offset(e), 4);
        assert_eq!(coord_width(e), 4);
        // empty pattern contributes nothing.
        assert_eq!(coords.byte_total(0, 0), 0);
        assert_eq!(coords.byte_total(0, 0b111), 12);
    }

    #[test]
    fn test_coords_mixed_widths() {
        let fields = vec![fixed(0, 1), fixed(1, 8), fixed(2, 2)];
        let coords = FieldCoords::build(&fields);
        let e = coords.entry(0, 0b111);
        assert_eq!(coord_offset(e), 9);
        assert_eq!(coord_width(e), 2);
        let e = coords.entry(0, 0b110);
        assert_eq!(coord_offset(e), 8);
        assert_eq!(coord_width(e), 2);
    }

    #[test]
    fn test_var_coords_tracks_last_var() {
        let fields = vec![fixed(0, 4), var(1, 64, 1), var(2, 64, 1)];
        let coords = FieldCoords::build(&fields);
        assert_eq!(coords.var_entry(0, 0b001), NO_VAR);
        // last var among {0,1} is field 1, entry offset 4.
        let ve = coords.var_entry(0, 0b011);
        assert_eq!(coord_offset(ve), 4);
        assert_eq!(coord_width(ve), 1);
        // last var among {0,1,2} is field 2.
        let ve = coords.var_entry(0, 0b111);
        assert_eq!(coord_offset(ve), 5);
        assert_eq!(coord_width(ve), 1);
        // field 1 null: field 2's entry directly follows field 0.
        let ve = coords.var_entry(0, 0b101);
        assert_eq!(coord_offset(ve), 4);
    }

    #[test]
    fn test_coords_second_byte_independent() {
        // 10 fields spanning two null-map bytes.
        let fields: Vec<_> = (0..10).map(|i| fixed(i, 4)).collect();
        let coords = FieldCoords::build(&fields);
        // second byte only has 2 fields; offsets restart per byte and
        // are accumulated by the caller.
        let e = coords.entry(1, 0b11);
        assert_eq!(coord_offset(e), 4);
        assert_eq!(coord_width(e), 4);
        assert_eq!(coords.byte_total(0, 0xff), 32);
    }
}
