use std::sync::Arc;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use gwsessions::{LaneLock, SessionStore};
use tracing::debug;

pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::minutes(5);

/// Runs `store.prune` (and lane cleanup) at most once per `interval`,
/// regardless of how often `try_prune` is called.
pub struct LazyPruner {
    store: Arc<SessionStore>,
    lanes: Arc<LaneLock<gwcore::ConversationKey>>,
    max_idle: Duration,
    interval: Duration,
    last_run: Mutex<Option<DateTime<Utc>>>,
}

impl LazyPruner {
    pub fn new(store: Arc<SessionStore>, lanes: Arc<LaneLock<gwcore::ConversationKey>>, max_idle: Duration, interval: Duration) -> Self {
        Self { store, lanes, max_idle, interval, last_run: Mutex::new(None) }
    }

    /// Runs a prune pass if `interval` has elapsed since the last run,
    /// returning the number of sessions removed (0 if skipped).
    pub fn try_prune(&self) -> usize {
        let now = Utc::now();
        {
            let mut last_run = self.last_run.lock().expect("pruner lock poisoned");
            if let Some(last) = *last_run {
                if now - last < self.interval {
                    return 0;
                }
            }
            *last_run = Some(now);
        }

        let removed = self.store.prune(self.max_idle);
        let active = self.store.active_keys();
        self.lanes.cleanup(&active);
        if removed > 0 {
            debug!(removed, "lazy pruner reclaimed idle sessions");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwcore::ConversationKey;

    #[test]
    fn second_call_within_interval_is_a_noop() {
        let store = Arc::new(SessionStore::new(0));
        let lanes = Arc::new(LaneLock::new());
        store.get_or_create(&ConversationKey::new("t", "c", ""), "main").unwrap();

        let pruner = LazyPruner::new(store.clone(), lanes, Duration::hours(1), Duration::minutes(5));
        // max_idle is 1h, so nothing is actually stale; first call still
        // records last_run even though it removes 0.
        assert_eq!(pruner.try_prune(), 0);
        assert_eq!(pruner.try_prune(), 0);
    }

    #[test]
    fn prunes_idle_sessions_and_cleans_lanes() {
        let store = Arc::new(SessionStore::new(0));
        let lanes = Arc::new(LaneLock::new());
        let key = ConversationKey::new("t", "c", "");
        store.get_or_create(&key, "main").unwrap();

        let pruner = LazyPruner::new(store.clone(), lanes, Duration::seconds(-1), Duration::zero());
        let removed = pruner.try_prune();
        assert_eq!(removed, 1);
        assert!(store.get(&key).is_none());
    }
}
