use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct Lane {
    mutex: Arc<AsyncMutex<()>>,
    ref_count: Arc<AtomicUsize>,
}

/// Per-conversation serialization primitive.
///
/// A global `std::sync::Mutex` protects only the key→lane map; the actual
/// per-key critical section is an async mutex acquired *after* releasing
/// the global lock, so unrelated keys never block each other waiting on
/// map bookkeeping.
pub struct LaneLock<K> {
    lanes: StdMutex<HashMap<K, Lane>>,
}

impl<K: Eq + Hash + Clone> LaneLock<K> {
    pub fn new() -> Self {
        Self { lanes: StdMutex::new(HashMap::new()) }
    }

    /// Block until the current holder for `key` (if any) releases, then
    /// return a guard that releases on drop.
    pub async fn acquire(&self, key: &K) -> LaneGuard<K> {
        let (mutex, ref_count) = {
            let mut lanes = self.lanes.lock().expect("lane map poisoned");
            let lane = lanes.entry(key.clone()).or_insert_with(|| Lane {
                mutex: Arc::new(AsyncMutex::new(())),
                ref_count: Arc::new(AtomicUsize::new(0)),
            });
            lane.ref_count.fetch_add(1, Ordering::SeqCst);
            (Arc::clone(&lane.mutex), Arc::clone(&lane.ref_count))
        };
        let permit = mutex.lock_owned().await;
        LaneGuard { ref_count, permit: Some(permit), _key: key.clone() }
    }

    /// Drop lanes whose key is no longer in `active_keys` and which have no
    /// queued or in-flight acquirers. A lane whose key went stale but is
    /// still referenced survives until a later call finds its ref-count at
    /// zero.
    pub fn cleanup(&self, active_keys: &HashSet<K>) {
        let mut lanes = self.lanes.lock().expect("lane map poisoned");
        lanes.retain(|key, lane| active_keys.contains(key) || lane.ref_count.load(Ordering::SeqCst) > 0);
    }

    pub fn len(&self) -> usize {
        self.lanes.lock().expect("lane map poisoned").len()
    }
}

impl<K: Eq + Hash + Clone> Default for LaneLock<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the lane for its key when dropped.
pub struct LaneGuard<K> {
    _key: K,
    ref_count: Arc<AtomicUsize>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for LaneGuard<K> {
    fn drop(&mut self) {
        self.permit.take();
        self.ref_count.fetch_sub(1, Ordering::SeqCst);
    }
}
