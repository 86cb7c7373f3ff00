//! Deferred destruction of completed contexts.
//!
//! Destroying a context can involve large XML trees and upload
//! buffers; doing it on the request thread lengthens tail latency.
//! Entries move through two queues: the common worker promotes entries
//! whose last outside reference is gone, the unique worker performs the
//! actual destruction.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

// refcount polling cadence of the common worker
const SCAN_INTERVAL: Duration = Duration::from_millis(50);

struct Shared<T> {
    // lock order: common ≺ unique
    common: Mutex<VecDeque<Arc<T>>>,
    unique: Mutex<VecDeque<Arc<T>>>,
    common_cv: Condvar,
    unique_cv: Condvar,
    stopped: AtomicBool,
    max_size: usize,
}

/// Two-stage deferred destructor for `Arc<T>` values.
pub struct CleanupManager<T: Send + Sync + 'static> {
    shared: Arc<Shared<T>>,
    common_thread: Option<JoinHandle<()>>,
    unique_thread: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> std::fmt::Debug for CleanupManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupManager")
            .field("max_size", &self.shared.max_size)
            .finish()
    }
}

impl<T: Send + Sync + 'static> CleanupManager<T> {
    /// A manager whose queues hold at most `max_size` entries each.
    pub fn new(max_size: usize) -> Self {
        let shared = Arc::new(Shared {
            common: Mutex::new(VecDeque::new()),
            unique: Mutex::new(VecDeque::new()),
            common_cv: Condvar::new(),
            unique_cv: Condvar::new(),
            stopped: AtomicBool::new(false),
            max_size,
        });
        let common_thread = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name("xscript-cleanup-common".into())
                .spawn(move || common_worker(&shared))
                .expect("spawn cleanup thread")
        };
        let unique_thread = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name("xscript-cleanup-unique".into())
                .spawn(move || unique_worker(&shared))
                .expect("spawn cleanup thread")
        };
        Self {
            shared,
            common_thread: Some(common_thread),
            unique_thread: Some(unique_thread),
        }
    }

    /// Hand an entry over for deferred destruction.
    ///
    /// Returns false under back-pressure (the common queue is full);
    /// the caller then destroys the entry itself rather than block.
    pub fn push(&self, entry: Arc<T>) -> bool {
        let mut common = self.shared.common.lock();
        if common.len() >= self.shared.max_size {
            return false;
        }
        common.push_back(entry);
        drop(common);
        self.shared.common_cv.notify_all();
        true
    }

    /// Entries currently queued in either stage.
    pub fn queued(&self) -> usize {
        self.shared.common.lock().len() + self.shared.unique.lock().len()
    }
}

fn common_worker<T: Send + Sync>(shared: &Shared<T>) {
    loop {
        let mut common = shared.common.lock();
        loop {
            if shared.stopped.load(Ordering::SeqCst) {
                return;
            }
            if !common.is_empty() && !unique_full(shared) {
                break;
            }
            // waits are bounded so reference counts are re-scanned even
            // without an explicit wakeup
            let _ = shared.common_cv.wait_for(&mut common, SCAN_INTERVAL);
        }

        let mut unique = shared.unique.lock();
        let mut remaining = shared.max_size.saturating_sub(unique.len());
        let mut moved = false;
        let mut index = 0;
        while index < common.len() && remaining > 0 {
            if Arc::strong_count(&common[index]) == 1 {
                if let Some(entry) = common.remove(index) {
                    unique.push_back(entry);
                    remaining -= 1;
                    moved = true;
                }
            } else {
                index += 1;
            }
        }
        drop(unique);
        drop(common);
        if moved {
            shared.unique_cv.notify_all();
        }
    }
}

fn unique_worker<T: Send + Sync>(shared: &Shared<T>) {
    loop {
        let mut unique = shared.unique.lock();
        while unique.is_empty() {
            if shared.stopped.load(Ordering::SeqCst) {
                return;
            }
            shared.unique_cv.wait(&mut unique);
        }
        let entry = unique.pop_front();
        drop(unique);
        // the actual destruction, outside both locks
        drop(entry);
        shared.common_cv.notify_all();
    }
}

fn unique_full<T: Send + Sync>(shared: &Shared<T>) -> bool {
    shared.unique.lock().len() >= shared.max_size
}

impl<T: Send + Sync + 'static> Drop for CleanupManager<T> {
    fn drop(&mut self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.common_cv.notify_all();
        self.shared.unique_cv.notify_all();
        if let Some(thread) = self.common_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.unique_thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn destroys_once_unique() {
        let drops = Arc::new(AtomicUsize::new(0));
        let manager = CleanupManager::new(16);

        let entry = Arc::new(Tracked(drops.clone()));
        assert!(manager.push(entry.clone()));
        // still referenced by the caller: must not be destroyed yet
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(entry);
        let deadline = Instant::now() + Duration::from_secs(2);
        while drops.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn back_pressure_rejects_pushes() {
        let drops = Arc::new(AtomicUsize::new(0));
        let manager = CleanupManager::new(1);
        // keep an outside reference so the queue stays occupied
        let held = Arc::new(Tracked(drops.clone()));
        assert!(manager.push(held.clone()));
        let second = Arc::new(Tracked(drops.clone()));
        // the single slot is taken: the caller keeps ownership
        assert!(!manager.push(second.clone()));
        assert_eq!(Arc::strong_count(&second), 1);
        drop(held);
        drop(second);
    }
}
