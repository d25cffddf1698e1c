use dashmap::DashMap;
use gwchannels::InboundMessage;
use gwcore::ConversationKey;
use tokio::sync::oneshot;

/// The operator's decision on a pending approval request.
#[derive(Debug, Clone)]
pub struct ApprovalResponse {
    pub approved: bool,
    pub reason: Option<String>,
}

struct Pending {
    key: ConversationKey,
    waiter: oneshot::Sender<ApprovalResponse>,
}

/// Side-channel mapping from approval-id to the agent waiting on it.
///
/// Resolution is routed around the lane lock: the agent holding a lane
/// while it awaits approval would otherwise deadlock against the inbound
/// message carrying the approve/deny decision.
pub struct ApprovalManager {
    pending: DashMap<String, Pending>,
}

impl ApprovalManager {
    pub fn new() -> Self {
        Self { pending: DashMap::new() }
    }

    /// Register a pending approval, returning the receiver half the agent
    /// should await.
    pub fn register(&self, id: impl Into<String>, key: ConversationKey) -> oneshot::Receiver<ApprovalResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.into(), Pending { key, waiter: tx });
        rx
    }

    /// Resolve a pending approval. Returns `true` iff an entry for `id` was
    /// present; the entry is removed atomically regardless of whether the
    /// waiter is still listening.
    pub fn resolve(&self, id: &str, response: ApprovalResponse) -> bool {
        match self.pending.remove(id) {
            Some((_, pending)) => {
                let _ = pending.waiter.send(response);
                true
            }
            None => false,
        }
    }

    /// Remove a pending approval without resolving it (e.g. on timeout),
    /// returning its conversation key if it was present.
    pub fn remove(&self, id: &str) -> Option<ConversationKey> {
        self.pending.remove(id).map(|(_, p)| p.key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Detect whether `msg` looks like an approval response, returning its
    /// id and decision.
    ///
    /// Checks the opaque raw payload first (`{"approval_id", "approved",
    /// "reason"?}`), then falls back to a leading `approve <id>` or
    /// `deny|reject <id> [reason]` token in the message text (case
    /// insensitive).
    pub fn is_approval_response(msg: &InboundMessage) -> Option<(String, ApprovalResponse)> {
        if let Some(obj) = msg.raw.as_object() {
            if let Some(id) = obj.get("approval_id").and_then(|v| v.as_str()) {
                let approved = obj.get("approved").and_then(|v| v.as_bool()).unwrap_or(false);
                let reason = obj.get("reason").and_then(|v| v.as_str()).map(String::from);
                return Some((id.to_string(), ApprovalResponse { approved, reason }));
            }
        }

        let text = msg.text();
        let trimmed = text.trim();
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let verb = parts.next()?.to_lowercase();
        let rest = parts.next().unwrap_or("").trim();
        if rest.is_empty() {
            return None;
        }

        match verb.as_str() {
            "approve" => Some((rest.to_string(), ApprovalResponse { approved: true, reason: None })),
            "deny" | "reject" => {
                let mut tail = rest.splitn(2, char::is_whitespace);
                let id = tail.next().unwrap_or("").to_string();
                let reason = tail.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
                Some((id, ApprovalResponse { approved: false, reason }))
            }
            _ => None,
        }
    }
}

impl Default for ApprovalManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwchannels::{Chat, ChatType, ContentBlock, Sender};

    fn msg_with_text(text: &str) -> InboundMessage {
        InboundMessage {
            id: "m1".into(),
            timestamp: chrono::Utc::now(),
            channel: "test".into(),
            sender: Sender { id: "alice".into(), username: None, display_name: None },
            chat: Chat { id: "c1".into(), chat_type: ChatType::Dm, title: None },
            thread_id: None,
            reply_to_id: None,
            blocks: vec![ContentBlock::text(text)],
            mentions: None,
            raw: serde_json::Value::Null,
        }
    }

    fn msg_with_raw(raw: serde_json::Value) -> InboundMessage {
        let mut m = msg_with_text("");
        m.raw = raw;
        m
    }

    #[tokio::test]
    async fn register_then_resolve_delivers_response() {
        let mgr = ApprovalManager::new();
        let rx = mgr.register("a1", ConversationKey::new("t", "c", ""));
        assert!(mgr.resolve("a1", ApprovalResponse { approved: true, reason: None }));
        let response = rx.await.unwrap();
        assert!(response.approved);
        assert_eq!(mgr.len(), 0);
    }

    #[test]
    fn resolve_unknown_id_returns_false() {
        let mgr = ApprovalManager::new();
        assert!(!mgr.resolve("ghost", ApprovalResponse { approved: true, reason: None }));
    }

    #[test]
    fn detects_json_raw_payload() {
        let msg = msg_with_raw(serde_json::json!({"approval_id": "xyz", "approved": false, "reason": "too risky"}));
        let (id, response) = ApprovalManager::is_approval_response(&msg).unwrap();
        assert_eq!(id, "xyz");
        assert!(!response.approved);
        assert_eq!(response.reason.as_deref(), Some("too risky"));
    }

    #[test]
    fn detects_approve_text_case_insensitive() {
        let msg = msg_with_text("APPROVE xyz");
        let (id, response) = ApprovalManager::is_approval_response(&msg).unwrap();
        assert_eq!(id, "xyz");
        assert!(response.approved);
    }

    #[test]
    fn detects_deny_text_with_reason() {
        let msg = msg_with_text("deny xyz not today");
        let (id, response) = ApprovalManager::is_approval_response(&msg).unwrap();
        assert_eq!(id, "xyz");
        assert!(!response.approved);
        assert_eq!(response.reason.as_deref(), Some("not today"));
    }

    #[test]
    fn unrelated_text_is_not_an_approval() {
        let msg = msg_with_text("hello there");
        assert!(ApprovalManager::is_approval_response(&msg).is_none());
    }
}
