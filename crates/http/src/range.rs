//! Zero-copy byte-range helpers.
//!
//! All of the environment, cookie, query and multipart parsing operates
//! on `&[u8]` subslices of the original buffer; nothing is copied until
//! a `String` has to be produced.

use memchr::memchr;
use memchr::memmem;

/// Split `data` at the first occurrence of `byte`.
///
/// Returns `(head, tail)` with the delimiter consumed. When the
/// delimiter is absent, `head` is the whole input and `tail` is empty.
pub fn split_once(data: &[u8], byte: u8) -> (&[u8], &[u8]) {
    match memchr(byte, data) {
        Some(pos) => (&data[..pos], &data[pos + 1..]),
        None => (data, &data[data.len()..]),
    }
}

/// Split `data` at the first occurrence of any byte in `set`.
pub fn split_first_of<'a>(data: &'a [u8], set: &[u8]) -> (&'a [u8], &'a [u8]) {
    match data.iter().position(|b| set.contains(b)) {
        Some(pos) => (&data[..pos], &data[pos + 1..]),
        None => (data, &data[data.len()..]),
    }
}

/// Split `data` at the first occurrence of the multi-byte `needle`.
pub fn split_str<'a>(data: &'a [u8], needle: &[u8]) -> (&'a [u8], &'a [u8]) {
    match memmem::find(data, needle) {
        Some(pos) => (&data[..pos], &data[pos + needle.len()..]),
        None => (data, &data[data.len()..]),
    }
}

/// Trim ASCII whitespace from both ends.
pub fn trim(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &data[start..end]
}

/// Drop `left` bytes from the front and `right` bytes from the back.
///
/// Saturates to the empty slice when the range collapses.
pub fn truncate(data: &[u8], left: usize, right: usize) -> &[u8] {
    if left + right >= data.len() {
        return &data[data.len()..];
    }
    &data[left..data.len() - right]
}

/// Case-insensitive prefix test.
pub fn starts_with_ci(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && eq_ci(&data[..prefix.len()], prefix)
}

/// Case-insensitive equality over ASCII.
pub fn eq_ci(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.eq_ignore_ascii_case(y))
}
