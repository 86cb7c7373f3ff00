//! Auxiliary per-block metadata.

use crate::{TypedMap, TypedValue};
use xscript_xml::Node;

const ELAPSED_TIME_PREFIX: &[u8] = b"Elapsed-time:";

/// Reserved keys that never carry user data.
pub(crate) const RESERVED_META_KEYS: &[&str] = &["elapsed-time", "expire-time", "last-modified"];

/// The key/value document produced alongside a block's main output
/// (upstream response headers, final URL, timings). Carries the binary
/// form used by distributed cache backends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    data: TypedMap,
    elapsed_time: Option<i32>,
}

impl Meta {
    /// An empty meta document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.elapsed_time.is_none()
    }

    /// Record a string entry. Reserved keys are ignored.
    pub fn set_string(&mut self, name: &str, value: impl Into<String>) {
        if !is_reserved(name) {
            self.data.set(name, TypedValue::String(value.into()));
        }
    }

    /// Record a multi-valued entry. Reserved keys are ignored.
    pub fn set_array(&mut self, name: &str, values: Vec<String>) {
        if !is_reserved(name) {
            self.data.set(
                name,
                TypedValue::Array(values.into_iter().map(TypedValue::String).collect()),
            );
        }
    }

    /// A recorded entry.
    pub fn get(&self, name: &str) -> &TypedValue {
        self.data.find(name)
    }

    /// Snapshot of all entries, in key order.
    pub fn entries(&self) -> Vec<(String, TypedValue)> {
        self.data
            .iter()
            .map(|(key, value)| (key.to_owned(), value.clone()))
            .collect()
    }

    /// Record the production time of the block result.
    pub fn set_elapsed_time(&mut self, millis: i32) {
        self.elapsed_time = Some(millis);
    }

    /// The recorded production time, if any.
    pub fn elapsed_time(&self) -> Option<i32> {
        self.elapsed_time
    }

    /// The binary wire format: an optional `Elapsed-time:` i32 chunk
    /// followed by length-prefixed key/value pairs.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(elapsed) = self.elapsed_time {
            out.extend_from_slice(ELAPSED_TIME_PREFIX);
            out.extend_from_slice(&elapsed.to_le_bytes());
            out.extend_from_slice(b"\r\n");
        }
        for (key, value) in self.data.iter() {
            out.extend_from_slice(&(key.len() as u32).to_le_bytes());
            out.extend_from_slice(key.as_bytes());
            value.serialize(&mut out);
        }
        out
    }

    /// Decode the binary wire format.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut meta = Self::new();
        let mut rest = data;
        if rest.starts_with(ELAPSED_TIME_PREFIX) {
            rest = &rest[ELAPSED_TIME_PREFIX.len()..];
            if rest.len() < 6 {
                return None;
            }
            meta.elapsed_time = Some(i32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]));
            if &rest[4..6] != b"\r\n" {
                return None;
            }
            rest = &rest[6..];
        }
        while !rest.is_empty() {
            if rest.len() < 4 {
                return None;
            }
            let key_len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            rest = &rest[4..];
            if rest.len() < key_len {
                return None;
            }
            let key = std::str::from_utf8(&rest[..key_len]).ok()?.to_owned();
            rest = &rest[key_len..];
            let (value, tail) = TypedValue::deserialize(rest)?;
            meta.data.set(key, value);
            rest = tail;
        }
        Some(meta)
    }

    /// The XML form spliced next to the block output when the block
    /// declares a `<xscript:meta>` child.
    pub fn to_node(&self) -> Node {
        let mut root = Node::new("meta");
        if let Some(elapsed) = self.elapsed_time {
            root.push_element(Node::new("elapsed-time").with_text(elapsed.to_string()));
        }
        for (key, value) in self.data.iter() {
            match value {
                TypedValue::Array(items) => {
                    for item in items {
                        root.push_element(named_node(key, &item.as_string()));
                    }
                }
                other => root.push_element(named_node(key, &other.as_string())),
            }
        }
        root
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_META_KEYS
        .iter()
        .any(|reserved| name.eq_ignore_ascii_case(reserved))
}

fn named_node(name: &str, value: &str) -> Node {
    let valid = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Node::new(name).with_text(value)
    } else {
        Node::new("param")
            .with_attr("name", name)
            .with_text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_round_trip() {
        let mut meta = Meta::new();
        meta.set_elapsed_time(125);
        meta.set_string("URL", "http://upstream/x");
        meta.set_array(
            "HTTP_SET_COOKIE",
            vec!["a=1".to_owned(), "b=2".to_owned()],
        );
        let encoded = meta.serialize();
        let decoded = Meta::parse(&encoded).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn reserved_keys_are_ignored() {
        let mut meta = Meta::new();
        meta.set_string("expire-time", "1");
        meta.set_string("Last-Modified", "2");
        assert!(meta.is_empty());
    }

    #[test]
    fn xml_form() {
        let mut meta = Meta::new();
        meta.set_string("HTTP_CONTENT_TYPE", "text/xml");
        assert_eq!(
            meta.to_node().to_string(),
            "<meta><HTTP_CONTENT_TYPE>text/xml</HTTP_CONTENT_TYPE></meta>"
        );
    }

    #[test]
    fn garbage_fails_to_parse() {
        assert!(Meta::parse(&[0xff, 0x00, 0x01]).is_none());
    }
}
