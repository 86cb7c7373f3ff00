//! The two-tier document cache.

use crate::{CacheCounters, CacheEntry, CacheStrategy, CounterSnapshot, DistributedBackend, LruCache};
use md5::{Digest, Md5};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use xscript_core::{BlockResultCache, CacheLookup, CachedResult, Tag};
use xscript_http::Request;
use xscript_xml::Document;

/// Fingerprint→document cache: an in-process LRU in front of an
/// optional distributed backend, with per-strategy key composition and
/// optional prefetch-ahead refresh.
pub struct DocCache {
    local: Mutex<LruCache<String, Arc<CacheEntry>>>,
    strategies: hashbrown::HashMap<String, CacheStrategy>,
    backend: Option<Arc<dyn DistributedBackend>>,
    counters: CacheCounters,
    prefetch_ratio: Option<f64>,
}

impl std::fmt::Debug for DocCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocCache")
            .field("strategies", &self.strategies.keys().collect::<Vec<_>>())
            .field("backend", &self.backend.is_some())
            .field("prefetch_ratio", &self.prefetch_ratio)
            .finish()
    }
}

impl DocCache {
    /// A cache with a local tier of `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            local: Mutex::new(LruCache::new(capacity)),
            strategies: hashbrown::HashMap::new(),
            backend: None,
            counters: CacheCounters::new(),
            prefetch_ratio: None,
        }
    }

    /// Attach a distributed backend as the second tier.
    pub fn with_backend(mut self, backend: Arc<dyn DistributedBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Enable prefetch-ahead at `ratio` of each entry's lifetime
    /// (`0 < ratio < 1`).
    pub fn with_prefetch_ratio(mut self, ratio: f64) -> Self {
        if ratio > 0.0 && ratio < 1.0 {
            self.prefetch_ratio = Some(ratio);
        }
        self
    }

    /// Register a page strategy under its name.
    pub fn add_strategy(&mut self, strategy: CacheStrategy) {
        self.strategies.insert(strategy.name().to_owned(), strategy);
    }

    /// Usage counters.
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    fn fingerprint(&self, strategy: Option<&str>, key: &str, request: &Request) -> String {
        let mut composed = String::from(key);
        if let Some(strategy) = strategy.and_then(|name| self.strategies.get(name)) {
            composed.push('|');
            composed.push_str(&strategy.create_key(request));
        }
        let digest = Md5::digest(composed.as_bytes());
        let mut hex = String::with_capacity(32);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex
    }

    fn fetch(&self, fingerprint: &str) -> Option<Arc<CacheEntry>> {
        if let Some(entry) = self.local.lock().get(&fingerprint.to_owned()).cloned() {
            return Some(entry);
        }
        let backend = self.backend.as_ref()?;
        let blob = backend.load(fingerprint)?;
        let entry = Arc::new(CacheEntry::decode(&blob)?);
        self.local
            .lock()
            .insert(fingerprint.to_owned(), entry.clone());
        Some(entry)
    }

    fn evict(&self, fingerprint: &str) {
        self.local.lock().remove(&fingerprint.to_owned());
    }

    fn in_prefetch_window(&self, entry: &CacheEntry, now: SystemTime) -> bool {
        let (Some(ratio), Some(expire)) = (self.prefetch_ratio, entry.tag.expire_time) else {
            return false;
        };
        let Ok(lifetime) = expire.duration_since(entry.stored_at) else {
            return false;
        };
        let threshold = entry.stored_at + lifetime.mul_f64(ratio);
        now >= threshold
    }

    fn to_cached_result(entry: &CacheEntry) -> Option<CachedResult> {
        let doc = if entry.doc_text.is_empty() {
            Document::empty()
        } else {
            Document::parse(&entry.doc_text).ok()?
        };
        Some(CachedResult {
            doc,
            meta: entry.meta.clone(),
            tag: entry.tag,
        })
    }
}

impl BlockResultCache for DocCache {
    fn lookup(&self, strategy: Option<&str>, key: &str, request: &Request) -> CacheLookup {
        let fingerprint = self.fingerprint(strategy, key, request);
        let Some(entry) = self.fetch(&fingerprint) else {
            self.counters.miss();
            return CacheLookup::Miss;
        };
        let now = SystemTime::now();

        if entry.tag.expired(now) {
            self.evict(&fingerprint);
            self.counters.expire();
            self.counters.miss();
            return CacheLookup::Miss;
        }

        let Some(result) = Self::to_cached_result(&entry) else {
            self.evict(&fingerprint);
            self.counters.miss();
            return CacheLookup::Miss;
        };

        match entry.tag.expire_time {
            Some(_) => {
                // exactly one loader per window performs the refresh
                if self.in_prefetch_window(&entry, now) && entry.mark_prefetch() {
                    self.counters.miss();
                    return CacheLookup::Revalidate(result);
                }
                self.counters.hit();
                CacheLookup::Fresh(result)
            }
            None => {
                // no expiry: usable only through conditional refresh
                self.counters.miss();
                CacheLookup::Revalidate(result)
            }
        }
    }

    fn store(
        &self,
        strategy: Option<&str>,
        key: &str,
        request: &Request,
        result: &CachedResult,
        cache_time: Option<Duration>,
    ) {
        let fingerprint = self.fingerprint(strategy, key, request);
        let mut tag = result.tag;
        tag.modified = true;
        if tag.expire_time.is_none() {
            if let Some(lifetime) = cache_time {
                tag.expire_time = Some(SystemTime::now() + lifetime);
            }
        }
        let entry = Arc::new(CacheEntry::new(
            result.doc.serialize_root(),
            result.meta.clone(),
            tag,
        ));
        if let Some(backend) = &self.backend {
            let lifetime = tag
                .expire_time
                .and_then(|expire| expire.duration_since(SystemTime::now()).ok());
            backend.save(&fingerprint, &entry.encode(), lifetime);
        }
        self.local.lock().insert(fingerprint, entry);
        self.counters.store();
        log::debug!("stored cache entry for {key}");
    }

    fn note_excluded(&self) {
        self.counters.exclude();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xscript_core::Meta;
    use xscript_http::Encoder;

    fn request() -> Request {
        Request::from_env_lines(&["REQUEST_METHOD=GET"], Vec::new(), &Encoder::cp1251()).unwrap()
    }

    fn result(expire: Option<Duration>) -> CachedResult {
        CachedResult {
            doc: Document::parse("<r/>").unwrap(),
            meta: Meta::new(),
            tag: Tag {
                last_modified: Some(SystemTime::now()),
                expire_time: expire.map(|d| SystemTime::now() + d),
                modified: true,
            },
        }
    }

    #[test]
    fn fresh_entries_hit() {
        let cache = DocCache::new(16);
        let request = request();
        cache.store(None, "k", &request, &result(Some(Duration::from_secs(60))), None);
        assert!(matches!(
            cache.lookup(None, "k", &request),
            CacheLookup::Fresh(_)
        ));
        let counters = cache.counters();
        assert_eq!(counters.hits, 1);
        assert_eq!(counters.stored, 1);
    }

    #[test]
    fn expired_entries_are_removed() {
        let cache = DocCache::new(16);
        let request = request();
        let mut expired = result(None);
        expired.tag.expire_time = Some(SystemTime::now() - Duration::from_secs(1));
        // store() refuses to resurrect the expiry, so plant directly
        let entry = Arc::new(CacheEntry::new(
            expired.doc.serialize_root(),
            Meta::new(),
            expired.tag,
        ));
        cache
            .local
            .lock()
            .insert(cache.fingerprint(None, "k", &request), entry);

        assert!(matches!(
            cache.lookup(None, "k", &request),
            CacheLookup::Miss
        ));
        let counters = cache.counters();
        assert_eq!(counters.expired, 1);
        // removed: the next lookup is a plain miss
        assert!(matches!(
            cache.lookup(None, "k", &request),
            CacheLookup::Miss
        ));
        assert_eq!(cache.counters().expired, 1);
    }

    #[test]
    fn no_expiry_means_revalidate() {
        let cache = DocCache::new(16);
        let request = request();
        cache.store(None, "k", &request, &result(None), None);
        assert!(matches!(
            cache.lookup(None, "k", &request),
            CacheLookup::Revalidate(_)
        ));
    }

    #[test]
    fn prefetch_misses_exactly_once() {
        let cache = DocCache::new(16).with_prefetch_ratio(0.5);
        let request = request();
        // store an entry whose prefetch point is already behind us
        let tag = Tag {
            last_modified: None,
            expire_time: Some(SystemTime::now() + Duration::from_secs(5)),
            modified: true,
        };
        let entry = CacheEntry {
            doc_text: "<r/>".to_owned(),
            meta: Meta::new(),
            tag,
            stored_at: SystemTime::now() - Duration::from_secs(100),
            prefetch_marked: std::sync::atomic::AtomicBool::new(false),
        };
        cache
            .local
            .lock()
            .insert(cache.fingerprint(None, "k", &request), Arc::new(entry));

        assert!(matches!(
            cache.lookup(None, "k", &request),
            CacheLookup::Revalidate(_)
        ));
        // the window is marked: subsequent lookups serve the entry
        assert!(matches!(
            cache.lookup(None, "k", &request),
            CacheLookup::Fresh(_)
        ));
    }

    #[test]
    fn distributed_tier_round_trip() {
        let backend = Arc::new(crate::InMemoryBackend::new());
        let request = request();
        {
            let cache = DocCache::new(16).with_backend(backend.clone());
            cache.store(None, "k", &request, &result(Some(Duration::from_secs(60))), None);
        }
        assert_eq!(backend.len(), 1);
        // a fresh process with an empty local tier reads through
        let cache = DocCache::new(16).with_backend(backend);
        assert!(matches!(
            cache.lookup(None, "k", &request),
            CacheLookup::Fresh(_)
        ));
    }

    #[test]
    fn strategy_separates_requests() {
        let mut cache = DocCache::new(16);
        cache.add_strategy(
            CacheStrategy::new("page").with_query(crate::QueryStrategy::all()),
        );
        let request_a = Request::from_env_lines(
            &["REQUEST_METHOD=GET", "QUERY_STRING=user=1"],
            Vec::new(),
            &Encoder::cp1251(),
        )
        .unwrap();
        let request_b = Request::from_env_lines(
            &["REQUEST_METHOD=GET", "QUERY_STRING=user=2"],
            Vec::new(),
            &Encoder::cp1251(),
        )
        .unwrap();
        cache.store(
            Some("page"),
            "k",
            &request_a,
            &result(Some(Duration::from_secs(60))),
            None,
        );
        assert!(matches!(
            cache.lookup(Some("page"), "k", &request_a),
            CacheLookup::Fresh(_)
        ));
        assert!(matches!(
            cache.lookup(Some("page"), "k", &request_b),
            CacheLookup::Miss
        ));
    }
}
