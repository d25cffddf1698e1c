use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identifies a single logical conversation: a (channel, chat, thread) triple.
///
/// Two inbound messages route to the same session, the same lane, and the
/// same slot in the session store iff their keys compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    /// Stable lowercase channel identifier, e.g. "telegram".
    pub channel: String,
    /// Platform-native chat identifier.
    pub chat_id: String,
    /// Forum/thread identifier. Empty when the platform has no sub-threads.
    #[serde(default)]
    pub thread_id: String,
}

impl ConversationKey {
    pub fn new(channel: impl Into<String>, chat_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            thread_id: thread_id.into(),
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.thread_id.is_empty() {
            write!(f, "{}:{}", self.channel, self.chat_id)
        } else {
            write!(f, "{}:{}:{}", self.channel, self.chat_id, self.thread_id)
        }
    }
}

/// Role of a single turn in a session's conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single entry in a session's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Read-only projection of a session handed to hooks.
///
/// Hooks never see `history` — only the worker currently holding the lane
/// for this key may mutate it.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub id: String,
    pub key: ConversationKey,
    pub agent_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    metadata: HashMap<String, serde_json::Value>,
}

impl SessionView {
    pub fn new(
        id: String,
        key: ConversationKey,
        agent_id: String,
        created_at: chrono::DateTime<chrono::Utc>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self { id, key, agent_id, created_at, metadata }
    }

    pub fn metadata_get(&self, k: &str) -> Option<&serde_json::Value> {
        self.metadata.get(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_omits_empty_thread() {
        let k = ConversationKey::new("telegram", "123", "");
        assert_eq!(k.to_string(), "telegram:123");
    }

    #[test]
    fn display_includes_thread_when_present() {
        let k = ConversationKey::new("telegram", "123", "7");
        assert_eq!(k.to_string(), "telegram:123:7");
    }

    #[test]
    fn equality_is_fieldwise() {
        let a = ConversationKey::new("telegram", "123", "");
        let b = ConversationKey::new("telegram", "123", "");
        let c = ConversationKey::new("telegram", "124", "");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
