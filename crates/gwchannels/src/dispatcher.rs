use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{channel::Channel, error::DispatchError, types::OutboundMessage};

/// Name→adapter registry routing outbound messages to the channel named by
/// `OutboundMessage::channel`.
///
/// Registration is rare and write-locks the map; `send`/`get` take the read
/// side so unrelated sends never block each other.
pub struct Dispatcher {
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { channels: RwLock::new(HashMap::new()) }
    }

    pub async fn register(&self, channel: Arc<dyn Channel>) -> Result<(), DispatchError> {
        let name = channel.name().to_string();
        let mut guard = self.channels.write().await;
        if guard.contains_key(&name) {
            return Err(DispatchError::DuplicateChannel { name });
        }
        info!(channel = %name, "registering channel adapter");
        guard.insert(name, channel);
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.read().await.get(name).cloned()
    }

    pub async fn send(&self, ctx: CancellationToken, msg: &OutboundMessage) -> Result<(), DispatchError> {
        let channel = self
            .get(&msg.channel)
            .await
            .ok_or_else(|| DispatchError::UnknownChannel { name: msg.channel.clone() })?;
        channel
            .send(ctx, msg)
            .await
            .map_err(|source| DispatchError::Send { name: msg.channel.clone(), source })
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InboxSubmit;
    use crate::error::ChannelError;
    use crate::types::{Chat, ChatType, ContentBlock};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestChannel {
        name: String,
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Channel for TestChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, _ctx: CancellationToken, _msg: &OutboundMessage) -> Result<(), ChannelError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn set_inbox(&self, _submit: InboxSubmit) {}
    }

    fn outbound(channel: &str) -> OutboundMessage {
        OutboundMessage {
            channel: channel.to_string(),
            chat: Chat { id: "c1".into(), chat_type: ChatType::Dm, title: None },
            thread_id: None,
            reply_to_id: None,
            blocks: vec![ContentBlock::text("hi")],
            hints: None,
        }
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let d = Dispatcher::new();
        let a = Arc::new(TestChannel { name: "test".into(), sends: AtomicUsize::new(0) });
        let b = Arc::new(TestChannel { name: "test".into(), sends: AtomicUsize::new(0) });
        assert!(d.register(a).await.is_ok());
        assert!(matches!(d.register(b).await, Err(DispatchError::DuplicateChannel { .. })));
    }

    #[tokio::test]
    async fn send_routes_by_channel_name() {
        let d = Dispatcher::new();
        let ch = Arc::new(TestChannel { name: "test".into(), sends: AtomicUsize::new(0) });
        d.register(ch.clone()).await.unwrap();
        d.send(CancellationToken::new(), &outbound("test")).await.unwrap();
        assert_eq!(ch.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_channel_is_reported() {
        let d = Dispatcher::new();
        let err = d.send(CancellationToken::new(), &outbound("nope")).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownChannel { .. }));
    }
}
