//! `multipart/form-data` body parsing.

use crate::range::{split_once, split_str, starts_with_ci, trim, truncate};
use crate::{Encoder, Error};

/// Extract the `boundary=` token from a `Content-Type` header value and
/// return it with the leading `--` prefix attached.
pub fn get_boundary(content_type: &str) -> Result<String, Error> {
    let bytes = content_type.as_bytes();
    let (_, tail) = split_once(bytes, b';');
    let tail = trim(tail);
    if starts_with_ci(tail, b"boundary") {
        let (_, value) = split_once(tail, b'=');
        let boundary = trim(value);
        let mut result = String::with_capacity(boundary.len() + 2);
        result.push_str("--");
        result.push_str(&String::from_utf8_lossy(boundary));
        return Ok(result);
    }
    Err(Error::NoBoundary)
}

/// One decoded part of a multipart body.
#[derive(Debug)]
pub(crate) enum Part {
    /// An ordinary form field.
    Arg { name: String, value: String },
    /// An uploaded file; the range indexes the enclosing body buffer.
    File {
        name: String,
        remote_name: String,
        content_type: String,
        begin: usize,
        end: usize,
    },
}

/// Walk a multipart body, producing one [`Part`] per non-empty part.
///
/// File content is reported as a byte range into `body` so uploads are
/// never copied out of the request buffer.
pub(crate) fn parse_multipart(
    body: &[u8],
    boundary: &str,
    encoder: &Encoder,
) -> Result<Vec<Part>, Error> {
    let mut parts = Vec::new();
    let mut rest = body;
    let mut offset = 0usize;
    while !rest.is_empty() {
        let (head, tail) = split_str(rest, boundary.as_bytes());
        let consumed = rest.len() - tail.len();
        let head_offset = offset;
        offset += consumed;
        let part = truncate(head, 2, 2);
        if !part.is_empty() {
            // +2 skips the \r\n following the previous boundary
            if let Some(parsed) = parse_part(part, head_offset + 2, encoder)? {
                parts.push(parsed);
            }
        }
        rest = tail;
    }
    Ok(parts)
}

fn parse_part(part: &[u8], part_offset: usize, encoder: &Encoder) -> Result<Option<Part>, Error> {
    let (headers, content) = split_str(part, b"\r\n\r\n");
    let content_offset = part_offset + headers.len() + 4;

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    let mut rest = headers;
    while !rest.is_empty() {
        let (line, tail) = split_str(rest, b"\r\n");
        parse_part_header(line, &mut name, &mut filename, &mut content_type, encoder);
        rest = tail;
    }

    let Some(name) = name else {
        return Ok(None);
    };

    if let Some(remote_name) = filename {
        Ok(Some(Part::File {
            name,
            remote_name,
            content_type: content_type.unwrap_or_else(|| "application/octet-stream".to_owned()),
            begin: content_offset,
            end: content_offset + content.len(),
        }))
    } else {
        Ok(Some(Part::Arg {
            name,
            value: encoder.recover(content),
        }))
    }
}

fn parse_part_header(
    line: &[u8],
    name: &mut Option<String>,
    filename: &mut Option<String>,
    content_type: &mut Option<String>,
    encoder: &Encoder,
) {
    let (header_name, header_value) = split_once(line, b':');
    let header_value = trim(header_value);
    if crate::range::eq_ci(header_name, b"content-type") {
        *content_type = Some(encoder.recover(header_value));
        return;
    }
    if !crate::range::eq_ci(header_name, b"content-disposition") {
        return;
    }
    let mut rest = header_value;
    while !rest.is_empty() {
        let (attr, tail) = split_once(rest, b';');
        let (key, value) = split_once(trim(attr), b'=');
        let value = unquote(trim(value));
        if crate::range::eq_ci(key, b"name") {
            *name = Some(encoder.recover(value));
        } else if crate::range::eq_ci(key, b"filename") {
            *filename = Some(encoder.recover(value));
        }
        rest = trim(tail);
    }
}

fn unquote(data: &[u8]) -> &[u8] {
    if data.len() >= 2 && data.first() == Some(&b'"') && data.last() == Some(&b'"') {
        &data[1..data.len() - 1]
    } else {
        data
    }
}

/// Assemble a multipart body from `(name, value)` fields, for tests and
/// outbound multipart posts.
pub fn encode_multipart(boundary: &str, fields: &[(String, String)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(boundary.as_bytes());
        body.extend_from_slice(b"\r\nContent-Disposition: form-data; name=\"");
        body.extend_from_slice(name.as_bytes());
        body.extend_from_slice(b"\"\r\n\r\n");
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(boundary.as_bytes());
    body.extend_from_slice(b"--\r\n");
    body
}
