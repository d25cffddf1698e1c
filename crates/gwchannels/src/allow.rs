use std::collections::HashSet;

use crate::types::InboundMessage;

/// O(1) accept/deny of inbound by sender or chat identity.
///
/// Deny-by-default: an allow-list with no entries in either set denies every
/// message. A wildcard `"*"` entry in a set allows everything along that
/// dimension.
pub struct AllowList {
    users: HashSet<String>,
    groups: HashSet<String>,
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

impl AllowList {
    pub fn new<U, G>(users: U, groups: G) -> Self
    where
        U: IntoIterator<Item = String>,
        G: IntoIterator<Item = String>,
    {
        Self {
            users: users.into_iter().map(|s| normalize(&s)).collect(),
            groups: groups.into_iter().map(|s| normalize(&s)).collect(),
        }
    }

    pub fn is_allowed(&self, msg: &InboundMessage) -> bool {
        if self.users.is_empty() && self.groups.is_empty() {
            return false;
        }
        Self::matches(&self.users, &msg.sender.id) || Self::matches(&self.groups, &msg.chat.id)
    }

    fn matches(set: &HashSet<String>, value: &str) -> bool {
        if set.contains("*") {
            return true;
        }
        set.contains(&normalize(value))
    }
}
