//! Conditional-caching tags.

use std::time::{Duration, SystemTime};

/// The freshness descriptor attached to a cacheable block result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Upstream `Last-Modified`, when known.
    pub last_modified: Option<SystemTime>,
    /// Upstream `Expires` or a strategy-assigned expiry, when known.
    pub expire_time: Option<SystemTime>,
    /// False when a conditional revalidation answered "not modified".
    pub modified: bool,
}

impl Default for Tag {
    fn default() -> Self {
        Self {
            last_modified: None,
            expire_time: None,
            modified: true,
        }
    }
}

impl Tag {
    /// A tag with neither timestamp.
    pub fn new() -> Self {
        Self::default()
    }

    /// A tag that expires `lifetime` from now.
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            expire_time: Some(SystemTime::now() + lifetime),
            ..Self::default()
        }
    }

    /// Whether the expiry lies in the past.
    pub fn expired(&self, now: SystemTime) -> bool {
        matches!(self.expire_time, Some(expire) if expire <= now)
    }

    /// Whether any freshness information is present at all.
    pub fn defined(&self) -> bool {
        self.last_modified.is_some() || self.expire_time.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_modified_and_undefined() {
        let tag = Tag::new();
        assert!(tag.modified);
        assert!(!tag.defined());
        assert!(!tag.expired(SystemTime::now()));
    }

    #[test]
    fn expiry() {
        let now = SystemTime::now();
        let expired = Tag {
            expire_time: Some(now - Duration::from_secs(1)),
            ..Tag::new()
        };
        assert!(expired.expired(now));
        let fresh = Tag::with_lifetime(Duration::from_secs(60));
        assert!(!fresh.expired(now));
    }
}
