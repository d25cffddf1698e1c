use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{ChatType, InboundMessage};

/// Admission mode for group chats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupPolicyMode {
    AllowAll,
    RequireMention,
    /// Any mode string this core doesn't recognize fails closed.
    #[serde(other)]
    Unknown,
}

/// Admission filter for group chats (require-mention, allow/deny lists).
///
/// Direct messages always admit regardless of mode or list membership.
pub struct GroupPolicy {
    mode: GroupPolicyMode,
    allow_list: HashSet<String>,
    deny_list: HashSet<String>,
}

impl GroupPolicy {
    pub fn new(mode: GroupPolicyMode, allow_list: HashSet<String>, deny_list: HashSet<String>) -> Self {
        Self { mode, allow_list, deny_list }
    }

    pub fn should_process(&self, msg: &InboundMessage) -> bool {
        if msg.chat.chat_type == ChatType::Dm {
            return true;
        }
        if self.deny_list.contains(&msg.sender.id) {
            return false;
        }
        match self.mode {
            GroupPolicyMode::AllowAll => true,
            GroupPolicyMode::RequireMention => {
                self.allow_list.contains(&msg.sender.id)
                    || msg.mentions.as_ref().map(|m| m.is_mentioned_bot).unwrap_or(false)
            }
            GroupPolicyMode::Unknown => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chat, ContentBlock, Mentions, Sender};
    use chrono::Utc;

    fn msg(chat_type: ChatType, sender_id: &str, mentioned: bool) -> InboundMessage {
        InboundMessage {
            id: "m1".into(),
            timestamp: Utc::now(),
            channel: "test".into(),
            sender: Sender { id: sender_id.into(), username: None, display_name: None },
            chat: Chat { id: "c1".into(), chat_type, title: None },
            thread_id: None,
            reply_to_id: None,
            blocks: vec![ContentBlock::text("hi")],
            mentions: Some(Mentions { is_mentioned_bot: mentioned, ids: vec![] }),
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn dm_always_admits() {
        let policy = GroupPolicy::new(GroupPolicyMode::Unknown, HashSet::new(), HashSet::new());
        assert!(policy.should_process(&msg(ChatType::Dm, "anyone", false)));
    }

    #[test]
    fn denied_sender_rejected_even_in_allow_all() {
        let mut deny = HashSet::new();
        deny.insert("bob".to_string());
        let policy = GroupPolicy::new(GroupPolicyMode::AllowAll, HashSet::new(), deny);
        assert!(!policy.should_process(&msg(ChatType::Group, "bob", false)));
    }

    #[test]
    fn allow_all_admits_groups() {
        let policy = GroupPolicy::new(GroupPolicyMode::AllowAll, HashSet::new(), HashSet::new());
        assert!(policy.should_process(&msg(ChatType::Group, "anyone", false)));
    }

    #[test]
    fn require_mention_without_mention_or_allowlist_rejects() {
        let policy = GroupPolicy::new(GroupPolicyMode::RequireMention, HashSet::new(), HashSet::new());
        assert!(!policy.should_process(&msg(ChatType::Group, "anyone", false)));
    }

    #[test]
    fn require_mention_admits_on_positive_mention() {
        let policy = GroupPolicy::new(GroupPolicyMode::RequireMention, HashSet::new(), HashSet::new());
        assert!(policy.should_process(&msg(ChatType::Group, "anyone", true)));
    }

    #[test]
    fn require_mention_admits_allowlisted_sender_without_mention() {
        let mut allow = HashSet::new();
        allow.insert("alice".to_string());
        let policy = GroupPolicy::new(GroupPolicyMode::RequireMention, allow, HashSet::new());
        assert!(policy.should_process(&msg(ChatType::Group, "alice", false)));
    }

    #[test]
    fn unknown_mode_fails_closed() {
        let policy = GroupPolicy::new(GroupPolicyMode::Unknown, HashSet::new(), HashSet::new());
        assert!(!policy.should_process(&msg(ChatType::Group, "anyone", true)));
    }
}
