//! Cache observability counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic usage counters every cache exposes.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    stored: AtomicU64,
    excluded: AtomicU64,
    expired: AtomicU64,
}

/// A point-in-time copy of [`CacheCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    /// Entries served from cache.
    pub hits: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
    /// Entries written.
    pub stored: u64,
    /// Results produced but excluded from storage.
    pub excluded: u64,
    /// Entries dropped because their expiry had passed.
    pub expired: u64,
}

impl CacheCounters {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn store(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn exclude(&self) {
        self.excluded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn expire(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            excluded: self.excluded.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}
