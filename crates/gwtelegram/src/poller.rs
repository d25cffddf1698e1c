//! Reference Telegram adapter: long-polls `getUpdates` and implements the
//! `Channel` trait directly over `reqwest`, rather than a full bot-dispatcher
//! framework — the wire protocol is an out-of-scope external concern and only
//! the adapter shape matters here.

use std::collections::HashSet;
use std::sync::RwLock as StdRwLock;
use std::time::Duration;

use async_trait::async_trait;
use gwchannels::allow::AllowList;
use gwchannels::chunk::{self, ChunkOptions};
use gwchannels::policy::{GroupPolicy, GroupPolicyMode};
use gwchannels::{Chat, ChatType, Channel, ChannelError, ContentBlock, InboundMessage, InboxSubmit, Mentions, OutboundMessage, Sender};
use gwcore::TelegramConfig;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TelegramError;

const CHANNEL_NAME: &str = "telegram";
const BACKOFF_BASE_SECS: u64 = 2;
const BACKOFF_MAX_SECS: u64 = 60;
const JITTER_FRACTION: f64 = 0.10;

pub struct TelegramPoller {
    http: Client,
    bot_token: String,
    poll_timeout_secs: u64,
    allow_list: AllowList,
    group_policy: GroupPolicy,
    bot_username: StdRwLock<Option<String>>,
    inbox: StdRwLock<Option<InboxSubmit>>,
}

impl TelegramPoller {
    pub fn new(config: &TelegramConfig) -> Self {
        let mode = if config.require_mention { GroupPolicyMode::RequireMention } else { GroupPolicyMode::AllowAll };
        let mention_allow: HashSet<String> = config.allow_users.iter().cloned().collect();
        Self {
            http: Client::new(),
            bot_token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            allow_list: AllowList::new(config.allow_users.clone(), config.allow_groups.clone()),
            group_policy: GroupPolicy::new(mode, mention_allow, HashSet::new()),
            bot_username: StdRwLock::new(None),
            inbox: StdRwLock::new(None),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    /// Drives the long-poll loop until `ctx` is cancelled.
    pub async fn run(&self, ctx: CancellationToken) {
        if let Err(e) = self.refresh_bot_username().await {
            warn!(error = %e, "telegram: failed to resolve bot username; mention detection disabled until it recovers");
        }

        let mut offset: i64 = 0;
        let mut delay_secs = BACKOFF_BASE_SECS;

        info!("telegram long-poll adapter starting");
        loop {
            if ctx.is_cancelled() {
                return;
            }

            match self.get_updates(offset).await {
                Ok(updates) => {
                    delay_secs = BACKOFF_BASE_SECS;
                    for update in updates {
                        offset = update.update_id + 1;
                        self.handle_update(update);
                    }
                }
                Err(e) => {
                    let jitter = jitter_secs(delay_secs);
                    let total = delay_secs + jitter;
                    warn!(error = %e, retry_after_secs = total, "telegram getUpdates failed, backing off");
                    tokio::select! {
                        _ = ctx.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_secs(total)) => {}
                    }
                    delay_secs = (delay_secs * 2).min(BACKOFF_MAX_SECS);
                }
            }
        }
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        let resp: ApiResponse<Vec<Update>> = self
            .http
            .get(self.api_url("getUpdates"))
            .query(&[("offset", offset.to_string()), ("timeout", self.poll_timeout_secs.to_string())])
            .timeout(Duration::from_secs(self.poll_timeout_secs + 10))
            .send()
            .await?
            .json()
            .await?;

        if !resp.ok {
            return Err(TelegramError::Api { description: resp.description.unwrap_or_default() });
        }
        Ok(resp.result.unwrap_or_default())
    }

    async fn refresh_bot_username(&self) -> Result<(), TelegramError> {
        let resp: ApiResponse<TgUser> = self.http.get(self.api_url("getMe")).send().await?.json().await?;
        if !resp.ok {
            return Err(TelegramError::Api { description: resp.description.unwrap_or_default() });
        }
        let username = resp.result.and_then(|u| u.username);
        *self.bot_username.write().expect("bot username lock poisoned") = username;
        Ok(())
    }

    /// Advances the offset past every update it sees, applies the allow-list
    /// and group-policy guards, and pushes admitted messages into the wired
    /// inbox. Never errors — a rejected or malformed update is simply dropped.
    fn handle_update(&self, update: Update) {
        let Some(message) = update.message else { return };
        let Some(from) = message.from.as_ref() else { return };
        if from.is_bot.unwrap_or(false) {
            return;
        }

        let text = message.text.clone().or_else(|| message.caption.clone()).unwrap_or_default();
        if text.is_empty() {
            return;
        }

        let inbound = InboundMessage {
            id: message.message_id.to_string(),
            timestamp: chrono::Utc::now(),
            channel: CHANNEL_NAME.to_string(),
            sender: Sender { id: from.id.to_string(), username: from.username.clone(), display_name: from.first_name.clone() },
            chat: Chat { id: message.chat.id.to_string(), chat_type: map_chat_type(&message.chat.chat_type), title: message.chat.title.clone() },
            thread_id: message.message_thread_id.map(|t| t.to_string()),
            reply_to_id: None,
            blocks: vec![ContentBlock::text(text.clone())],
            mentions: Some(Mentions { is_mentioned_bot: self.contains_bot_mention(&text), ids: vec![] }),
            raw: serde_json::Value::Null,
        };

        if !self.allow_list.is_allowed(&inbound) {
            debug!(sender = %inbound.sender.id, "telegram: sender rejected by allow list");
            return;
        }
        if !self.group_policy.should_process(&inbound) {
            debug!(chat = %inbound.chat.id, "telegram: group policy rejected message");
            return;
        }

        let submit = self.inbox.read().expect("inbox lock poisoned").clone();
        let Some(submit) = submit else {
            warn!("telegram: update received before inbox was wired, dropping");
            return;
        };
        if let Err(e) = submit(inbound) {
            warn!(error = %e, "telegram: router rejected inbound message");
        }
    }

    fn contains_bot_mention(&self, text: &str) -> bool {
        match self.bot_username.read().expect("bot username lock poisoned").as_deref() {
            Some(username) if !username.is_empty() => text.contains(&format!("@{username}")),
            _ => false,
        }
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        let escaped = escape_markdown_v2(text);
        if self.post_send_message(chat_id, &escaped, Some("MarkdownV2")).await.is_ok() {
            return Ok(());
        }
        warn!(chat_id, "telegram: MarkdownV2 send rejected, falling back to plain text");
        self.post_send_message(chat_id, text, None).await
    }

    async fn post_send_message(&self, chat_id: i64, text: &str, parse_mode: Option<&str>) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({"chat_id": chat_id, "text": text});
        if let Some(mode) = parse_mode {
            body["parse_mode"] = serde_json::Value::String(mode.to_string());
        }
        self.post(&self.api_url("sendMessage"), &body).await
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<(), ChannelError> {
        let resp = self.http.post(url).json(body).send().await.map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        let parsed: ApiResponse<serde_json::Value> = resp.json().await.map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        if parsed.ok {
            Ok(())
        } else {
            Err(ChannelError::SendFailed(parsed.description.unwrap_or_default()))
        }
    }

    fn chat_id_of(chat: &Chat) -> Result<i64, ChannelError> {
        chat.id.parse().map_err(|_| ChannelError::SendFailed(format!("invalid telegram chat id: {}", chat.id)))
    }
}

#[async_trait]
impl Channel for TelegramPoller {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn send(&self, _ctx: CancellationToken, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let chat_id = Self::chat_id_of(&msg.chat)?;
        let pieces = chunk::split(msg, &ChunkOptions::default());
        for (i, piece) in pieces.iter().enumerate() {
            self.send_text(chat_id, &piece.text()).await?;
            if i + 1 < pieces.len() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
        Ok(())
    }

    fn set_inbox(&self, submit: InboxSubmit) {
        *self.inbox.write().expect("inbox lock poisoned") = Some(submit);
    }

    async fn send_typing(&self, _ctx: CancellationToken, chat: &Chat) -> Result<(), ChannelError> {
        let chat_id = Self::chat_id_of(chat)?;
        let body = serde_json::json!({"chat_id": chat_id, "action": "typing"});
        self.post(&self.api_url("sendChatAction"), &body).await
    }
}

fn map_chat_type(raw: &str) -> ChatType {
    match raw {
        "private" => ChatType::Dm,
        "channel" => ChatType::Broadcast,
        _ => ChatType::Group,
    }
}

/// Escape special characters for Telegram MarkdownV2.
fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '#' | '+' | '-' | '=' | '|' | '{' | '}' | '.' | '!') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Jitter offset (0 … `JITTER_FRACTION * base_secs`) derived from the
/// sub-second clock, avoiding a `rand` dependency for a single backoff knob.
fn jitter_secs(base_secs: u64) -> u64 {
    let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.subsec_nanos()).unwrap_or(0);
    let max_jitter = ((base_secs as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    from: Option<TgUser>,
    text: Option<String>,
    caption: Option<String>,
    message_thread_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
    #[serde(rename = "type")]
    chat_type: String,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    is_bot: Option<bool>,
    username: Option<String>,
    first_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwchannels::InboxError;
    use std::sync::{Arc, Mutex};

    fn config() -> TelegramConfig {
        TelegramConfig {
            bot_token: "test-token".into(),
            poll_timeout_secs: 30,
            allow_users: vec!["alice".into()],
            allow_groups: vec!["*".into()],
            require_mention: false,
        }
    }

    fn wire_inbox(poller: &TelegramPoller) -> Arc<Mutex<Vec<InboundMessage>>> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        poller.set_inbox(Arc::new(move |msg: InboundMessage| -> Result<(), InboxError> {
            sink.lock().unwrap().push(msg);
            Ok(())
        }));
        received
    }

    fn private_update(id: i64, username: &str, text: &str) -> Update {
        Update {
            update_id: id,
            message: Some(TgMessage {
                message_id: id,
                chat: TgChat { id: 111, chat_type: "private".into(), title: None },
                from: Some(TgUser { id: 42, is_bot: Some(false), username: Some(username.into()), first_name: None }),
                text: Some(text.into()),
                caption: None,
                message_thread_id: None,
            }),
        }
    }

    #[test]
    fn map_chat_type_covers_all_variants() {
        assert_eq!(map_chat_type("private"), ChatType::Dm);
        assert_eq!(map_chat_type("group"), ChatType::Group);
        assert_eq!(map_chat_type("supergroup"), ChatType::Group);
        assert_eq!(map_chat_type("channel"), ChatType::Broadcast);
    }

    #[test]
    fn escape_markdown_v2_escapes_specials() {
        let escaped = escape_markdown_v2("Hello. (world) [test]!");
        assert!(escaped.contains("\\."));
        assert!(escaped.contains("\\("));
        assert!(escaped.contains("\\)"));
        assert!(escaped.contains("\\["));
        assert!(escaped.contains("\\]"));
        assert!(escaped.contains("\\!"));
    }

    #[test]
    fn jitter_never_exceeds_the_fraction() {
        for _ in 0..20 {
            assert!(jitter_secs(100) <= 10);
        }
        assert_eq!(jitter_secs(0), 0);
    }

    #[test]
    fn allowed_sender_message_reaches_the_inbox() {
        let poller = TelegramPoller::new(&config());
        let received = wire_inbox(&poller);
        poller.handle_update(private_update(1, "alice", "hello"));
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].text(), "hello");
    }

    #[test]
    fn denied_sender_never_reaches_the_inbox() {
        let poller = TelegramPoller::new(&config());
        let received = wire_inbox(&poller);
        poller.handle_update(private_update(1, "mallory", "hello"));
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn bot_messages_are_ignored() {
        let poller = TelegramPoller::new(&config());
        let received = wire_inbox(&poller);
        let mut update = private_update(1, "alice", "hello");
        update.message.as_mut().unwrap().from.as_mut().unwrap().is_bot = Some(true);
        poller.handle_update(update);
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn empty_text_and_no_caption_is_dropped() {
        let poller = TelegramPoller::new(&config());
        let received = wire_inbox(&poller);
        let mut update = private_update(1, "alice", "");
        update.message.as_mut().unwrap().text = None;
        poller.handle_update(update);
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn update_without_wired_inbox_is_dropped_without_panicking() {
        let poller = TelegramPoller::new(&config());
        poller.handle_update(private_update(1, "alice", "hello"));
    }
}
