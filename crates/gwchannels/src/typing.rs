use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{channel::Channel, types::Chat};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Spawns a background task that sends a typing indicator immediately and
/// then every `interval` (default 1s when `interval` is zero) until `ctx` is
/// cancelled. Exits early after 3 consecutive send errors.
pub fn start_typing_loop(ctx: CancellationToken, channel: Arc<dyn Channel>, chat: Chat, interval: Duration) -> JoinHandle<()> {
    let interval = if interval.is_zero() { DEFAULT_INTERVAL } else { interval };

    tokio::spawn(async move {
        let mut consecutive_errors = 0u32;

        loop {
            if ctx.is_cancelled() {
                return;
            }

            match channel.send_typing(ctx.clone(), &chat).await {
                Ok(()) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(error = %e, consecutive_errors, "typing indicator send failed");
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        return;
                    }
                }
            }

            tokio::select! {
                _ = ctx.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::InboxSubmit;
    use crate::error::ChannelError;
    use crate::types::{ChatType, OutboundMessage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Channel for CountingChannel {
        fn name(&self) -> &str {
            "test"
        }

        async fn send(&self, _ctx: CancellationToken, _msg: &OutboundMessage) -> Result<(), ChannelError> {
            Ok(())
        }

        fn set_inbox(&self, _submit: InboxSubmit) {}

        async fn send_typing(&self, _ctx: CancellationToken, _chat: &Chat) -> Result<(), ChannelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ChannelError::SendFailed("boom".into()))
            } else {
                Ok(())
            }
        }
    }

    fn chat() -> Chat {
        Chat { id: "c1".into(), chat_type: ChatType::Dm, title: None }
    }

    #[tokio::test]
    async fn sends_at_least_one_indicator_before_cancellation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let channel = Arc::new(CountingChannel { calls: calls.clone(), fail: false });
        let ctx = CancellationToken::new();
        let handle = start_typing_loop(ctx.clone(), channel, chat(), Duration::from_millis(0));
        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.cancel();
        let _ = handle.await;
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn exits_after_three_consecutive_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let channel = Arc::new(CountingChannel { calls: calls.clone(), fail: true });
        let ctx = CancellationToken::new();
        let handle = start_typing_loop(ctx.clone(), channel, chat(), Duration::from_millis(1));
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
