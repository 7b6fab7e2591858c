//! Checked conversions between the integer widths used at the FFI boundary.
//!
//! Every size/count that crosses into a backend library goes through one of
//! these helpers; a `None` return maps to [`Status::Overflow`] (or the status
//! the call site requires) instead of silently truncating.
//!
//! [`Status::Overflow`]: crate::Status::Overflow

use std::ffi::{c_int, c_uint, c_ulong};

/// Add two sizes, failing on wrap.
pub(crate) fn add_size(a: usize, b: usize) -> Option<usize> {
    a.checked_add(b)
}

/// Multiply two sizes, failing on wrap.
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) fn mul_size(a: usize, b: usize) -> Option<usize> {
    a.checked_mul(b)
}

/// Narrow a size to a C `int`.
pub(crate) fn size_to_int(size: usize) -> Option<c_int> {
    c_int::try_from(size).ok()
}

/// Widen a C `int` to a size, failing on negative values.
pub(crate) fn int_to_size(i: c_int) -> Option<usize> {
    usize::try_from(i).ok()
}

/// Narrow a size to a C `unsigned int`.
#[cfg_attr(not(feature = "mysql"), allow(dead_code))]
pub(crate) fn size_to_uint(size: usize) -> Option<c_uint> {
    c_uint::try_from(size).ok()
}

/// Convert a C `unsigned long` to a size.
#[cfg_attr(not(feature = "mysql"), allow(dead_code))]
pub(crate) fn ulong_to_size(ul: c_ulong) -> Option<usize> {
    usize::try_from(ul).ok()
}

/// Narrow a size to a C `unsigned long`.
#[cfg_attr(not(feature = "mysql"), allow(dead_code))]
pub(crate) fn size_to_ulong(size: usize) -> Option<c_ulong> {
    c_ulong::try_from(size).ok()
}

/// Reinterpret a signed 64-bit value as unsigned, failing on negatives.
pub(crate) fn int64_to_uint64(i64: i64) -> Option<u64> {
    u64::try_from(i64).ok()
}

/// Strict decimal parse of a 64-bit integer.
///
/// Rejects empty input, trailing junk, and out-of-range values. Numeric
/// columns that arrive as text go through this before being handed to the
/// caller.
#[cfg_attr(not(any(feature = "mysql", feature = "postgres")), allow(dead_code))]
pub(crate) fn parse_i64(text: &str) -> Option<i64> {
    text.parse::<i64>().ok()
}

/// Strict decimal parse of an unsigned value bounded by `maxval`.
///
/// Used for port numbers (bounded by 65535), connect timeouts, and OID
/// values.
#[cfg_attr(not(any(feature = "mysql", feature = "postgres")), allow(dead_code))]
pub(crate) fn parse_u32_bounded(text: &str, maxval: u32) -> Option<u32> {
    match text.parse::<u32>() {
        Ok(v) if v <= maxval => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_size_wraps() {
        assert_eq!(add_size(1, 2), Some(3));
        assert_eq!(add_size(usize::MAX, 0), Some(usize::MAX));
        assert_eq!(add_size(usize::MAX, 1), None);
        assert_eq!(add_size(usize::MAX / 2 + 1, usize::MAX / 2 + 1), None);
    }

    #[test]
    fn mul_size_wraps() {
        assert_eq!(mul_size(4, 8), Some(32));
        assert_eq!(mul_size(0, usize::MAX), Some(0));
        assert_eq!(mul_size(usize::MAX, 2), None);
    }

    #[test]
    fn size_to_int_bounds() {
        assert_eq!(size_to_int(0), Some(0));
        assert_eq!(size_to_int(c_int::MAX as usize), Some(c_int::MAX));
        assert_eq!(size_to_int(c_int::MAX as usize + 1), None);
    }

    #[test]
    fn int_to_size_rejects_negative() {
        assert_eq!(int_to_size(0), Some(0));
        assert_eq!(int_to_size(c_int::MAX), Some(c_int::MAX as usize));
        assert_eq!(int_to_size(-1), None);
    }

    #[test]
    fn size_to_uint_bounds() {
        assert_eq!(size_to_uint(0), Some(0));
        assert_eq!(size_to_uint(c_uint::MAX as usize), Some(c_uint::MAX));
        if usize::BITS > c_uint::BITS {
            assert_eq!(size_to_uint(c_uint::MAX as usize + 1), None);
        }
    }

    #[test]
    fn ulong_to_size_fits() {
        assert_eq!(ulong_to_size(0), Some(0));
        assert_eq!(ulong_to_size(12345), Some(12345));
    }

    #[test]
    fn int64_to_uint64_rejects_negative() {
        assert_eq!(int64_to_uint64(0), Some(0));
        assert_eq!(int64_to_uint64(i64::MAX), Some(i64::MAX as u64));
        assert_eq!(int64_to_uint64(-1), None);
        assert_eq!(int64_to_uint64(i64::MIN), None);
    }

    #[test]
    fn parse_i64_strict() {
        assert_eq!(parse_i64("0"), Some(0));
        assert_eq!(parse_i64("-42"), Some(-42));
        assert_eq!(parse_i64("9223372036854775807"), Some(i64::MAX));
        assert_eq!(parse_i64("-9223372036854775808"), Some(i64::MIN));
        assert_eq!(parse_i64("9223372036854775808"), None);
        assert_eq!(parse_i64(""), None);
        assert_eq!(parse_i64("12x"), None);
        assert_eq!(parse_i64(" 12"), None);
    }

    #[test]
    fn parse_u32_bounded_range() {
        assert_eq!(parse_u32_bounded("65535", 65535), Some(65535));
        assert_eq!(parse_u32_bounded("65536", 65535), None);
        assert_eq!(parse_u32_bounded("", 65535), None);
        assert_eq!(parse_u32_bounded("-1", 65535), None);
        assert_eq!(parse_u32_bounded("5432abc", 65535), None);
    }
}
