//! Distributed backend interface.

use parking_lot::Mutex;
use std::time::Duration;

/// A remote store shared across processes (memcached-style). Entries
/// are immutable once stored.
pub trait DistributedBackend: Send + Sync {
    /// Fetch a blob by key.
    fn load(&self, key: &str) -> Option<Vec<u8>>;

    /// Store a blob with an optional lifetime hint.
    fn save(&self, key: &str, data: &[u8], lifetime: Option<Duration>);
}

/// A process-local backend for tests and single-host deployments.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: Mutex<hashbrown::HashMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    /// An empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DistributedBackend for InMemoryBackend {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().get(key).cloned()
    }

    fn save(&self, key: &str, data: &[u8], _lifetime: Option<Duration>) {
        self.entries.lock().insert(key.to_owned(), data.to_vec());
    }
}
