//! Header-name normalization and query parsing.

use crate::range::{split_first_of, split_once, trim};
use crate::{urldecode, Encoder, Error};

/// Normalize a CGI-style header name fragment: underscores become
/// hyphens, case is preserved (`ACCEPT_ENCODING` → `ACCEPT-ENCODING`).
pub fn normalize_input_header_name(name: &str) -> String {
    name.replace('_', "-")
}

/// Normalize a header name for output: each `-`-separated component is
/// capitalized (`content-type` → `Content-Type`).
pub fn normalize_output_header_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for (i, component) in name.trim().split('-').enumerate() {
        if i > 0 {
            result.push('-');
        }
        let mut chars = component.chars();
        if let Some(first) = chars.next() {
            result.extend(first.to_uppercase());
            result.push_str(chars.as_str());
        }
    }
    result
}

/// Parse a query string (`&`- or `;`-separated `k=v` pairs) into an
/// ordered list of name/value pairs. Both halves are url-decoded and
/// recovered to UTF-8.
pub fn parse_query(data: &[u8], encoder: &Encoder) -> Result<Vec<(String, String)>, Error> {
    let mut args = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let (head, tail) = split_first_of(rest, b"&;");
        let (key, value) = split_once(head, b'=');
        if !key.is_empty() {
            let key = encoder.recover(&urldecode(key)?);
            let value = encoder.recover(&urldecode(value)?);
            args.push((key, value));
        }
        rest = tail;
    }
    Ok(args)
}

/// Parse a `Cookie` header value into name/value pairs.
pub fn parse_cookies(data: &[u8], encoder: &Encoder) -> Vec<(String, String)> {
    let mut cookies = Vec::new();
    let mut rest = trim(data);
    while !rest.is_empty() {
        let (head, tail) = split_once(rest, b';');
        let (key, value) = split_once(trim(head), b'=');
        if !key.is_empty() {
            // A cookie that fails decoding is dropped rather than
            // failing the whole request.
            if let (Ok(key), Ok(value)) = (urldecode(key), urldecode(value)) {
                cookies.push((encoder.recover(&key), encoder.recover(&value)));
            }
        }
        rest = trim(tail);
    }
    cookies
}
