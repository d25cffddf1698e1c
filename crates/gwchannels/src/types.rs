use chrono::{DateTime, Utc};
use gwcore::ConversationKey;
use serde::{Deserialize, Serialize};

/// Sender identity as reported by the originating platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

/// Which kind of chat a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Dm,
    Group,
    Broadcast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    pub title: Option<String>,
}

/// Bot-mention metadata extracted by the adapter, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mentions {
    pub is_mentioned_bot: bool,
    #[serde(default)]
    pub ids: Vec<String>,
}

/// A single block of message content.
///
/// Serialization carries only the fields meaningful to its tag; `Location`
/// always emits both `lat` and `lon` (zero-substituted when the adapter
/// didn't have a real value), and no other variant ever emits them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { url: String, mime: String },
    Audio { url: String, mime: String, is_voice: bool },
    File { url: String, mime: String, name: String },
    Location { lat: f64, lon: f64 },
    Reaction { emoji: String },
    Raw { data: serde_json::Value },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Builds a location block, zero-substituting either coordinate that
    /// wasn't available from the source platform.
    pub fn location(lat: Option<f64>, lon: Option<f64>) -> Self {
        ContentBlock::Location { lat: lat.unwrap_or(0.0), lon: lon.unwrap_or(0.0) }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Delivery hints a channel adapter may honor on a best-effort basis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hints {
    #[serde(default)]
    pub disable_preview: bool,
    #[serde(default)]
    pub disable_notification: bool,
    pub parse_mode: Option<String>,
}

/// A message received from an external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    pub sender: Sender,
    pub chat: Chat,
    pub thread_id: Option<String>,
    pub reply_to_id: Option<String>,
    pub blocks: Vec<ContentBlock>,
    pub mentions: Option<Mentions>,
    /// Opaque original payload; parsed only where required (approval detection).
    pub raw: serde_json::Value,
}

impl InboundMessage {
    /// Derives the `ConversationKey` this message belongs to.
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(
            self.channel.clone(),
            self.chat.id.clone(),
            self.thread_id.clone().unwrap_or_default(),
        )
    }

    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A message to be delivered through the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat: Chat,
    pub thread_id: Option<String>,
    pub reply_to_id: Option<String>,
    pub blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub hints: Option<Hints>,
}

impl OutboundMessage {
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
