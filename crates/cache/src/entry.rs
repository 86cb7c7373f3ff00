//! Cache-entry binary codec.
//!
//! The wire form shared with distributed backends: a length-prefixed
//! document section followed by the meta stream, whose reserved
//! `expire-time` and `last-modified` keys carry the tag (seconds since
//! the epoch) and never user data.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use xscript_core::{Meta, Tag, TypedValue};

/// One stored block result.
#[derive(Debug)]
pub struct CacheEntry {
    /// Serialized result document.
    pub doc_text: String,
    /// The meta document stored alongside.
    pub meta: Meta,
    /// The producer's tag.
    pub tag: Tag,
    /// When the entry was stored.
    pub stored_at: SystemTime,
    pub(crate) prefetch_marked: AtomicBool,
}

impl CacheEntry {
    /// An entry stored now.
    pub fn new(doc_text: String, meta: Meta, tag: Tag) -> Self {
        Self {
            doc_text,
            meta,
            tag,
            stored_at: SystemTime::now(),
            prefetch_marked: AtomicBool::new(false),
        }
    }

    /// Encode for a distributed backend.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.doc_text.len() + 64);
        out.extend_from_slice(&(self.doc_text.len() as u32).to_le_bytes());
        out.extend_from_slice(self.doc_text.as_bytes());

        // tag timestamps travel as reserved meta keys
        let mut tail = Meta::new();
        if let Some(elapsed) = self.meta.elapsed_time() {
            tail.set_elapsed_time(elapsed);
        }
        let mut kv = tail.serialize();
        append_reserved(&mut kv, "expire-time", self.tag.expire_time);
        append_reserved(&mut kv, "last-modified", self.tag.last_modified);
        append_reserved(&mut kv, "stored-at", Some(self.stored_at));
        out.extend_from_slice(&kv);
        // user meta keys follow the reserved ones
        let user = self.meta.serialize();
        let user = strip_elapsed(&user);
        out.extend_from_slice(user);
        out
    }

    /// Decode a backend blob. `None` for malformed input.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }
        let doc_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let rest = &data[4..];
        if rest.len() < doc_len {
            return None;
        }
        let doc_text = std::str::from_utf8(&rest[..doc_len]).ok()?.to_owned();
        let meta_all = Meta::parse(&rest[doc_len..])?;

        let tag = Tag {
            expire_time: reserved_time(&meta_all, "expire-time"),
            last_modified: reserved_time(&meta_all, "last-modified"),
            modified: true,
        };
        let stored_at = reserved_time(&meta_all, "stored-at").unwrap_or(UNIX_EPOCH);

        // rebuild user meta without the reserved transport keys
        let mut meta = Meta::new();
        if let Some(elapsed) = meta_all.elapsed_time() {
            meta.set_elapsed_time(elapsed);
        }
        copy_user_keys(&meta_all, &mut meta);

        Some(Self {
            doc_text,
            meta,
            tag,
            stored_at,
            prefetch_marked: AtomicBool::new(false),
        })
    }

    pub(crate) fn mark_prefetch(&self) -> bool {
        !self.prefetch_marked.swap(true, Ordering::SeqCst)
    }
}

// the reserved keys bypass Meta's reserved-name filter by writing the
// raw kv form directly
fn append_reserved(out: &mut Vec<u8>, key: &str, time: Option<SystemTime>) {
    let Some(time) = time else { return };
    let secs = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    out.extend_from_slice(&(key.len() as u32).to_le_bytes());
    out.extend_from_slice(key.as_bytes());
    TypedValue::U64(secs).serialize(out);
}

fn strip_elapsed(serialized: &[u8]) -> &[u8] {
    const PREFIX: &[u8] = b"Elapsed-time:";
    if serialized.starts_with(PREFIX) && serialized.len() >= PREFIX.len() + 6 {
        &serialized[PREFIX.len() + 6..]
    } else {
        serialized
    }
}

fn reserved_time(meta: &Meta, key: &str) -> Option<SystemTime> {
    match meta.get(key) {
        TypedValue::U64(secs) => Some(UNIX_EPOCH + Duration::from_secs(*secs)),
        _ => None,
    }
}

const TRANSPORT_KEYS: &[&str] = &["expire-time", "last-modified", "stored-at", "elapsed-time"];

fn copy_user_keys(source: &Meta, dest: &mut Meta) {
    for (key, value) in source.entries() {
        if TRANSPORT_KEYS.iter().any(|t| key.eq_ignore_ascii_case(t)) {
            continue;
        }
        match value {
            TypedValue::Array(items) => {
                dest.set_array(&key, items.iter().map(TypedValue::as_string).collect())
            }
            other => dest.set_string(&key, other.as_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_tag_and_doc() {
        let tag = Tag {
            last_modified: Some(UNIX_EPOCH + Duration::from_secs(1_000_000)),
            expire_time: Some(UNIX_EPOCH + Duration::from_secs(2_000_000)),
            modified: true,
        };
        let mut meta = Meta::new();
        meta.set_elapsed_time(42);
        let entry = CacheEntry::new("<r><a>1</a></r>".to_owned(), meta, tag);

        let blob = entry.encode();
        let decoded = CacheEntry::decode(&blob).unwrap();
        assert_eq!(decoded.doc_text, "<r><a>1</a></r>");
        assert_eq!(decoded.tag.last_modified, tag.last_modified);
        assert_eq!(decoded.tag.expire_time, tag.expire_time);
        assert_eq!(decoded.meta.elapsed_time(), Some(42));
        assert_eq!(decoded.stored_at, entry.stored_at_rounded());
    }

    #[test]
    fn malformed_blobs_are_rejected() {
        assert!(CacheEntry::decode(&[]).is_none());
        assert!(CacheEntry::decode(&[9, 0, 0, 0, b'x']).is_none());
    }

    #[test]
    fn prefetch_marks_once() {
        let entry = CacheEntry::new(String::new(), Meta::new(), Tag::new());
        assert!(entry.mark_prefetch());
        assert!(!entry.mark_prefetch());
    }
}

#[cfg(test)]
impl CacheEntry {
    fn stored_at_rounded(&self) -> SystemTime {
        let secs = self
            .stored_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        UNIX_EPOCH + Duration::from_secs(secs)
    }
}
