use std::collections::HashSet;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use gwcore::ConversationKey;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::types::Session;

/// Concurrency-safe, in-memory mapping from conversation key to session.
///
/// Backed by a sharded concurrent map rather than a single reader-writer
/// lock around a `HashMap` — unrelated keys never contend with each other,
/// which matters once many lanes are active under the worker pool.
pub struct SessionStore {
    sessions: DashMap<ConversationKey, Session>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self { sessions: DashMap::new(), max_sessions }
    }

    /// Return the existing session for `key`, or create one.
    ///
    /// When `max_sessions` is configured (> 0) and already reached, a brand
    /// new key returns `(None, false)` instead of growing the store; an
    /// already-present key is unaffected by the cap.
    #[instrument(skip(self, agent_id), fields(key = %key))]
    pub fn get_or_create(&self, key: &ConversationKey, agent_id: &str) -> Result<(Option<Session>, bool)> {
        if let Some(existing) = self.sessions.get(key) {
            return Ok((Some(existing.clone()), false));
        }

        if self.max_sessions > 0 && self.sessions.len() >= self.max_sessions {
            return Ok((None, false));
        }

        let id = new_session_id()?;
        let now = Utc::now();
        let session = Session::new(id, key.clone(), agent_id.to_string(), now);
        self.sessions.insert(key.clone(), session.clone());
        debug!("session created");
        Ok((Some(session), true))
    }

    pub fn get(&self, key: &ConversationKey) -> Option<Session> {
        self.sessions.get(key).map(|s| s.clone())
    }

    /// Overwrite the stored session for `key` (e.g. after the pipeline
    /// mutates its history) and bump `last_active_at`.
    pub fn put(&self, mut session: Session) {
        session.last_active_at = Utc::now();
        self.sessions.insert(session.key.clone(), session);
    }

    /// Bump `last_active_at` without otherwise touching the session. No-op
    /// if `key` is not present.
    pub fn touch(&self, key: &ConversationKey) {
        if let Some(mut entry) = self.sessions.get_mut(key) {
            entry.last_active_at = Utc::now();
        }
    }

    /// Remove the session for `key`. No-op if absent.
    pub fn delete(&self, key: &ConversationKey) {
        self.sessions.remove(key);
    }

    /// Remove every session idle longer than `max_idle`, returning the count removed.
    pub fn prune(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let stale: Vec<ConversationKey> = self
            .sessions
            .iter()
            .filter(|entry| entry.last_active_at < cutoff)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &stale {
            self.sessions.remove(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterate all sessions under the store's lock. `f` must be fast and
    /// must not call back into store-mutating methods.
    pub fn range(&self, mut f: impl FnMut(&Session)) {
        for entry in self.sessions.iter() {
            f(entry.value());
        }
    }

    pub fn active_keys(&self) -> HashSet<ConversationKey> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }
}

fn new_session_id() -> Result<String> {
    let mut buf = [0u8; 16];
    getrandom::getrandom(&mut buf)?;
    Ok(hex::encode(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> ConversationKey {
        ConversationKey::new("test", id, "")
    }

    #[test]
    fn get_or_create_creates_once_then_reuses() {
        let store = SessionStore::new(0);
        let (first, created_first) = store.get_or_create(&key("a"), "main").unwrap();
        assert!(created_first);
        let first = first.unwrap();

        let (second, created_second) = store.get_or_create(&key("a"), "main").unwrap();
        assert!(!created_second);
        assert_eq!(second.unwrap().id, first.id);
    }

    #[test]
    fn cap_rejects_new_keys_but_not_existing() {
        let store = SessionStore::new(1);
        let (s1, created1) = store.get_or_create(&key("a"), "main").unwrap();
        assert!(created1);
        assert!(s1.is_some());

        let (s2, created2) = store.get_or_create(&key("b"), "main").unwrap();
        assert!(!created2);
        assert!(s2.is_none());

        // existing key still resolves even though the cap is reached
        let (s1_again, created_again) = store.get_or_create(&key("a"), "main").unwrap();
        assert!(!created_again);
        assert!(s1_again.is_some());
    }

    #[test]
    fn touch_and_delete_on_missing_key_are_noops() {
        let store = SessionStore::new(0);
        store.touch(&key("ghost"));
        store.delete(&key("ghost"));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn prune_removes_idle_sessions_only() {
        let store = SessionStore::new(0);
        store.get_or_create(&key("a"), "main").unwrap();
        store.get_or_create(&key("b"), "main").unwrap();

        // Backdate "a" past the idle cutoff.
        {
            let mut entry = store.sessions.get_mut(&key("a")).unwrap();
            entry.last_active_at = Utc::now() - Duration::hours(2);
        }

        let removed = store.prune(Duration::minutes(30));
        assert_eq!(removed, 1);
        assert!(store.get(&key("a")).is_none());
        assert!(store.get(&key("b")).is_some());
    }

    #[test]
    fn active_keys_reflects_current_contents() {
        let store = SessionStore::new(0);
        store.get_or_create(&key("a"), "main").unwrap();
        store.get_or_create(&key("b"), "main").unwrap();
        let keys = store.active_keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&key("a")));
    }
}
