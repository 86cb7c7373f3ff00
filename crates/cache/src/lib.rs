#![forbid(unsafe_code)]
#![deny(
    missing_copy_implementations,
    rustdoc::missing_crate_level_docs,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    unused_qualifications
)]

/*!
The document cache of the xscript engine.

Block results are cached under a composite fingerprint (block identity,
stylesheet mtimes, evaluated arguments, selected headers, and the page
strategy's selected query args and cookies). Entries live in an
in-process LRU per strategy, optionally backed by a distributed store;
freshness follows the block's tag with optional prefetch-ahead
(stale-while-revalidate).
*/

mod lru;
pub use lru::LruCache;

mod counters;
pub use counters::{CacheCounters, CounterSnapshot};

mod strategy;
pub use strategy::{CacheStrategy, CookieStrategy, QueryStrategy, StrategyError};

mod entry;
pub use entry::CacheEntry;

mod backend;
pub use backend::{DistributedBackend, InMemoryBackend};

mod doc_cache;
pub use doc_cache::DocCache;
