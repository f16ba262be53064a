//! Little-endian packing primitives shared by every encoded row.
//!
//! Widths 0/1/2/3/4/8 are the only supported integer storage widths.
//! The typed helpers perform no bounds validation: the caller
//! guarantees the buffer is large enough, and an out-of-bounds access
//! is a programming error that panics.

use crate::error::{Error, Result};
use std::fmt::Write as _;

/// Reads a signed little-endian integer of the given storage width.
/// Width 0 returns 0. The 3-byte form sign-extends from bit 23.
#[inline]
pub fn get_int(bytes: &[u8], idx: usize, width: usize) -> Result<i64> {
    match width {
        0 => Ok(0),
        1 => Ok(get_i8(bytes, idx) as i64),
        2 => Ok(get_i16(bytes, idx) as i64),
        3 => Ok(get_i24(bytes, idx) as i64),
        4 => Ok(get_i32(bytes, idx) as i64),
        8 => Ok(get_i64(bytes, idx)),
        _ => Err(Error::UnsupportedWidth(width)),
    }
}

/// Reads an unsigned little-endian integer of the given storage width.
/// Width 8 returns the full `u64` range.
#[inline]
pub fn get_uint(bytes: &[u8], idx: usize, width: usize) -> Result<u64> {
    match width {
        0 => Ok(0),
        1 => Ok(get_u8(bytes, idx) as u64),
        2 => Ok(get_u16(bytes, idx) as u64),
        3 => Ok(get_u24(bytes, idx) as u64),
        4 => Ok(get_u32(bytes, idx) as u64),
        8 => Ok(get_u64(bytes, idx)),
        _ => Err(Error::UnsupportedWidth(width)),
    }
}

/// Writes the low `width` bytes of `value` little-endian.
/// Returns bytes written. Out-of-range values truncate to the width.
#[inline]
pub fn put_int(bytes: &mut [u8], idx: usize, width: usize, value: i64) -> Result<usize> {
    match width {
        0 => {}
        1 => put_u8(bytes, idx, value as u8),
        2 => put_u16(bytes, idx, value as u16),
        3 => put_u24(bytes, idx, value as u32),
        4 => put_u32(bytes, idx, value as u32),
        8 => put_u64(bytes, idx, value as u64),
        _ => return Err(Error::UnsupportedWidth(width)),
    }
    Ok(width)
}

#[inline]
pub fn get_u8(bytes: &[u8], idx: usize) -> u8 {
    bytes[idx]
}

#[inline]
pub fn get_i8(bytes: &[u8], idx: usize) -> i8 {
    bytes[idx] as i8
}

#[inline]
pub fn get_u16(bytes: &[u8], idx: usize) -> u16 {
    u16::from_le_bytes([bytes[idx], bytes[idx + 1]])
}

#[inline]
pub fn get_i16(bytes: &[u8], idx: usize) -> i16 {
    get_u16(bytes, idx) as i16
}

#[inline]
pub fn get_u24(bytes: &[u8], idx: usize) -> u32 {
    bytes[idx] as u32 | (bytes[idx + 1] as u32) << 8 | (bytes[idx + 2] as u32) << 16
}

/// 3-byte medium int, sign-extended from bit 23.
#[inline]
pub fn get_i24(bytes: &[u8], idx: usize) -> i32 {
    (get_u24(bytes, idx) << 8) as i32 >> 8
}

#[inline]
pub fn get_u32(bytes: &[u8], idx: usize) -> u32 {
    u32::from_le_bytes([bytes[idx], bytes[idx + 1], bytes[idx + 2], bytes[idx + 3]])
}

#[inline]
pub fn get_i32(bytes: &[u8], idx: usize) -> i32 {
    get_u32(bytes, idx) as i32
}

#[inline]
pub fn get_u64(bytes: &[u8], idx: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[idx..idx + 8]);
    u64::from_le_bytes(buf)
}

#[inline]
pub fn get_i64(bytes: &[u8], idx: usize) -> i64 {
    get_u64(bytes, idx) as i64
}

#[inline]
pub fn put_u8(bytes: &mut [u8], idx: usize, value: u8) {
    bytes[idx] = value;
}

#[inline]
pub fn put_u16(bytes: &mut [u8], idx: usize, value: u16) {
    bytes[idx..idx + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn put_u24(bytes: &mut [u8], idx: usize, value: u32) {
    bytes[idx] = value as u8;
    bytes[idx + 1] = (value >> 8) as u8;
    bytes[idx + 2] = (value >> 16) as u8;
}

#[inline]
pub fn put_u32(bytes: &mut [u8], idx: usize, value: u32) {
    bytes[idx..idx + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn put_u64(bytes: &mut [u8], idx: usize, value: u64) {
    bytes[idx..idx + 8].copy_from_slice(&value.to_le_bytes());
}

/// Smallest length-prefix width able to represent `len`.
#[inline]
pub const fn var_width(len: usize) -> usize {
    if len == 0 {
        0
    } else if len < 0x100 {
        1
    } else if len < 0x10000 {
        2
    } else if len < 0x1000000 {
        3
    } else {
        4
    }
}

/// Character encoding of string fields. The encoding name comes from
/// the schema layer; only the encodings actually stored on disk are
/// supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Latin1,
}

impl Charset {
    pub fn from_name(name: &str) -> Result<Self> {
        if name.eq_ignore_ascii_case("utf-8") || name.eq_ignore_ascii_case("utf8") {
            Ok(Charset::Utf8)
        } else if name.eq_ignore_ascii_case("latin1") || name.eq_ignore_ascii_case("iso-8859-1") {
            Ok(Charset::Latin1)
        } else {
            Err(Error::UnsupportedCharset(name.to_string()))
        }
    }

    #[inline]
    pub fn decode(&self, data: &[u8]) -> Result<String> {
        match self {
            Charset::Utf8 => std::str::from_utf8(data)
                .map(str::to_string)
                .map_err(|_| Error::InvalidStringEncoding),
            Charset::Latin1 => Ok(data.iter().map(|&b| b as char).collect()),
        }
    }
}

/// Decodes a length-prefixed string. `width` is the declared number of
/// bytes available at `offset` including the prefix itself; a prefix
/// announcing more data than fits is a corruption signal.
pub fn decode_string(
    bytes: &[u8],
    offset: usize,
    width: usize,
    prefix_size: usize,
    charset: Charset,
) -> Result<String> {
    let len = get_uint(bytes, offset, prefix_size)? as usize;
    if len + prefix_size > width {
        return Err(Error::FieldTooNarrow { len, width });
    }
    charset.decode(&bytes[offset + prefix_size..offset + prefix_size + len])
}

/// Hex+ASCII rendering: 16 bytes per line in two groups of 8, with an
/// ASCII gutter. The format is consumed by external tooling and must
/// stay byte-stable.
pub fn hex_dump(bytes: &[u8], offset: usize, len: usize) -> String {
    let mut out = String::new();
    let end = offset + len;
    let mut pos = offset;
    while pos < end {
        let n = (end - pos).min(16);
        let chunk = &bytes[pos..pos + n];
        let mut line = String::new();
        let _ = write!(line, "{:08x}:", pos);
        for i in 0..16 {
            if i == 8 {
                line.push(' ');
            }
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(line, " {:02x}", b);
                }
                None => line.push_str("   "),
            }
        }
        line.push_str("  ");
        for i in 0..16 {
            if i == 8 {
                line.push(' ');
            }
            match chunk.get(i) {
                Some(&b) if (0x20..0x7f).contains(&b) => line.push(b as char),
                Some(_) => line.push('.'),
                None => line.push(' '),
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
        pos += n;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_round_trip_all_widths() {
        let mut buf = [0u8; 16];
        for &width in &[0usize, 1, 2, 3, 4, 8] {
            for &v in &[0i64, 1, -1, 127, -128, 0x7fff, -0x8000, 0x7fffff, -0x800000, 1 << 40] {
                let written = put_int(&mut buf, 2, width, v).unwrap();
                assert_eq!(written, width);
                let back = get_int(&buf, 2, width).unwrap();
                let expect = match width {
                    0 => 0,
                    8 => v,
                    w => {
                        // truncate then sign-extend from the width.
                        let shift = 64 - w * 8;
                        (v << shift) >> shift
                    }
                };
                assert_eq!(back, expect, "width={} v={}", width, v);
            }
        }
    }

    #[test]
    fn test_uint_round_trip() {
        let mut buf = [0u8; 16];
        put_int(&mut buf, 0, 3, 0xfedcba).unwrap();
        assert_eq!(get_uint(&buf, 0, 3).unwrap(), 0xfedcba);
        // same bytes read signed are negative.
        assert!(get_int(&buf, 0, 3).unwrap() < 0);
        put_int(&mut buf, 0, 8, -1).unwrap();
        assert_eq!(get_uint(&buf, 0, 8).unwrap(), u64::MAX);
    }

    #[test]
    fn test_unsupported_width() {
        let mut buf = [0u8; 16];
        assert!(matches!(
            get_int(&buf, 0, 5),
            Err(Error::UnsupportedWidth(5))
        ));
        assert!(matches!(
            get_uint(&buf, 0, 7),
            Err(Error::UnsupportedWidth(7))
        ));
        assert!(matches!(
            put_int(&mut buf, 0, 6, 1),
            Err(Error::UnsupportedWidth(6))
        ));
    }

    #[test]
    fn test_medium_int_sign_extension() {
        let mut buf = [0u8; 4];
        put_u24(&mut buf, 0, 0x800000);
        assert_eq!(get_i24(&buf, 0), -0x800000);
        put_u24(&mut buf, 0, 0x7fffff);
        assert_eq!(get_i24(&buf, 0), 0x7fffff);
    }

    #[test]
    fn test_var_width_boundaries() {
        assert_eq!(var_width(0), 0);
        assert_eq!(var_width(255), 1);
        assert_eq!(var_width(256), 2);
        assert_eq!(var_width(65535), 2);
        assert_eq!(var_width(65536), 3);
        assert_eq!(var_width(16777215), 3);
        assert_eq!(var_width(16777216), 4);
    }

    #[test]
    fn test_decode_string() {
        // 1-byte prefix, "ab"
        let buf = [2u8, b'a', b'b', 0];
        let s = decode_string(&buf, 0, 4, 1, Charset::Utf8).unwrap();
        assert_eq!(s, "ab");
    }

    #[test]
    fn test_decode_string_too_narrow() {
        let buf = [9u8, b'a', b'b'];
        let res = decode_string(&buf, 0, 3, 1, Charset::Utf8);
        assert!(matches!(
            res,
            Err(Error::FieldTooNarrow { len: 9, width: 3 })
        ));
    }

    #[test]
    fn test_charset_lookup() {
        assert_eq!(Charset::from_name("UTF-8").unwrap(), Charset::Utf8);
        assert_eq!(Charset::from_name("latin1").unwrap(), Charset::Latin1);
        assert!(Charset::from_name("utf-16").is_err());
    }

    #[test]
    fn test_latin1_decode() {
        let s = Charset::Latin1.decode(&[0xe9, b'x']).unwrap();
        assert_eq!(s, "\u{e9}x");
    }

    #[test]
    fn test_hex_dump_format() {
        let data = b"this is a test of hex dump";
        let out = hex_dump(data, 0, data.len());
        let expect = "\
00000000: 74 68 69 73 20 69 73 20  61 20 74 65 73 74 20 6f  this is  a test o
00000010: 66 20 68 65 78 20 64 75  6d 70                    f hex du mp\n";
        assert_eq!(out, expect);
    }
}
