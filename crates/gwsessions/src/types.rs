use std::collections::HashMap;

use chrono::{DateTime, Utc};
use gwcore::{ConversationKey, Turn};
use serde_json::Value;

/// Default maximum number of turns retained in `Session::history`.
pub const DEFAULT_MAX_HISTORY_LEN: usize = 100;

/// A live, in-memory conversation session.
///
/// There is no separate persistence layer in this core — `gwrouter` is
/// responsible for best-effort durable persistence via the injected
/// `SessionPersistence` contract.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub key: ConversationKey,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub history: Vec<Turn>,
    pub metadata: HashMap<String, Value>,
}

impl Session {
    pub fn new(id: String, key: ConversationKey, agent_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            key,
            agent_id,
            created_at: now,
            last_active_at: now,
            history: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Push a turn and trim history from the front so it does not exceed `max_len`.
    pub fn push_turn(&mut self, turn: Turn, max_len: usize) {
        self.history.push(turn);
        if max_len > 0 {
            while self.history.len() > max_len {
                self.history.remove(0);
            }
        }
    }

    pub fn view(&self) -> gwcore::SessionView {
        gwcore::SessionView::new(
            self.id.clone(),
            self.key.clone(),
            self.agent_id.clone(),
            self.created_at,
            self.metadata.clone(),
        )
    }
}
