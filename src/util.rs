//! Small helpers shared by the parser and the resolver.
//!
//! - Big-endian reads (via byteorder) for the fat header, which is stored
//!   big-endian unlike the Mach-O slices it wraps
//! - NUL-terminated string extraction from load commands (via memchr)
//! - Path-string helpers that keep embedded references byte-exact

use std::fs;

use byteorder::{BigEndian, ByteOrder};

// =============================================================================
// Unaligned Reads
// =============================================================================

/// Reads a big-endian u32 from a byte slice at the given offset.
///
/// # Panics
///
/// Panics if `offset + 4 > data.len()`.
#[inline(always)]
pub fn read_u32_be_at(data: &[u8], offset: usize) -> u32 {
    BigEndian::read_u32(&data[offset..])
}

/// Reads a big-endian u64 from a byte slice at the given offset.
///
/// # Panics
///
/// Panics if `offset + 8 > data.len()`.
#[inline(always)]
pub fn read_u64_be_at(data: &[u8], offset: usize) -> u64 {
    BigEndian::read_u64(&data[offset..])
}

// =============================================================================
// C Strings
// =============================================================================

/// Finds the position of the first null byte in a slice.
#[inline(always)]
pub fn memchr_null(data: &[u8]) -> usize {
    memchr::memchr(0, data).unwrap_or(data.len())
}

/// Reads the NUL-terminated string starting at `offset`.
///
/// Returns an empty string when `offset` is outside the slice.
pub fn c_string_at(data: &[u8], offset: usize) -> String {
    match data.get(offset..) {
        Some(bytes) => String::from_utf8_lossy(&bytes[..memchr_null(bytes)]).into_owned(),
        None => String::new(),
    }
}

// =============================================================================
// Path Strings
// =============================================================================

/// Appends a trailing `/` unless the path already ends with one.
///
/// Empty input stays empty.
pub fn ensure_trailing_slash(path: &str) -> String {
    if path.is_empty() || path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Splits a path string into its directory (with trailing slash) and file name.
///
/// A bare name yields an empty directory.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Checks whether a file exists, retrying with surrounding whitespace removed.
pub fn file_exists(path: &str) -> bool {
    if fs::metadata(path).is_ok() {
        return true;
    }
    let trimmed = path.trim();
    trimmed != path && !trimmed.is_empty() && fs::metadata(trimmed).is_ok()
}

/// Resolves symlinks and `.`/`..` components, returning `None` when the file is missing.
pub fn canonicalize(path: &str) -> Option<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return None;
    }
    fs::canonicalize(trimmed)
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}
