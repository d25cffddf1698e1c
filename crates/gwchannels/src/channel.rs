use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    error::ChannelError,
    types::{Chat, InboundMessage, OutboundMessage},
};

/// Error surface seen by an adapter when it pushes an inbound message through
/// its wired `InboxSubmit` callback. Deliberately disjoint from the router's
/// own submit-error enum so this crate never depends on `gwrouter`.
#[derive(Debug, Error)]
pub enum InboxError {
    #[error("router stopped accepting submissions")]
    Stopped,
    #[error("inbox is full")]
    Full,
}

/// Callback an adapter invokes to push an inbound message into the router.
///
/// The core guarantees exactly one `set_inbox` call per channel before it
/// begins submitting on that channel's behalf.
pub type InboxSubmit = Arc<dyn Fn(InboundMessage) -> Result<(), InboxError> + Send + Sync>;

/// A stream of text deltas fed to [`Channel::send_stream`].
pub type DeltaStream = std::pin::Pin<Box<dyn futures_util::Stream<Item = String> + Send>>;

/// Common interface implemented by every channel adapter (Telegram long-poll
/// reference adapter, test doubles, …).
///
/// Implementations must tolerate concurrent `send` calls — the dispatcher
/// does not serialize access to a single adapter.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier for this channel, e.g. `"telegram"`.
    fn name(&self) -> &str;

    /// Deliver a single outbound message.
    async fn send(&self, ctx: CancellationToken, msg: &OutboundMessage) -> Result<(), ChannelError>;

    /// Wire the callback used to push inbound messages into the router.
    fn set_inbox(&self, submit: InboxSubmit);

    /// Whether this adapter supports progressive-edit streaming.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Deliver a stream of text deltas as a progressively edited message.
    /// Adapters that don't support streaming inherit the default error.
    async fn send_stream(&self, _ctx: CancellationToken, _chat: &Chat, _deltas: DeltaStream) -> Result<(), ChannelError> {
        Err(ChannelError::Unsupported)
    }

    /// Send a single "is typing" indicator to `chat`.
    async fn send_typing(&self, _ctx: CancellationToken, _chat: &Chat) -> Result<(), ChannelError> {
        Err(ChannelError::Unsupported)
    }
}
