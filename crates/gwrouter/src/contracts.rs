use std::sync::Arc;

use async_trait::async_trait;
use gwchannels::{Dispatcher, OutboundMessage};
use gwcore::{SessionView, Turn};
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, DeliveryError, PersistError};

/// An LLM-facing executor resolved for a single session by an `AgentFactory`.
#[async_trait]
pub trait AgentLoop: Send + Sync {
    async fn respond(&self, ctx: CancellationToken, system_prompt: &str, history: &[Turn]) -> Result<String, AgentError>;
}

/// Resolves the agent loop that should handle a given session.
///
/// Called under the lane lock, so implementations may safely inspect (and,
/// via interior mutability on their own state, mutate) anything keyed off
/// the session.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn for_session(&self, session: &SessionView, inbound: &gwchannels::InboundMessage) -> Result<Arc<dyn AgentLoop>, AgentError>;

    /// Resolves the system/soul prompt for a session. Defaults to a generic
    /// assistant prompt; agents with a persona override this.
    fn soul_prompt(&self, _session: &SessionView) -> String {
        "You are a helpful assistant.".to_string()
    }
}

/// Delivers a built outbound message. Normally wired to the `Dispatcher`.
#[async_trait]
pub trait ResponseSender: Send + Sync {
    async fn send(&self, ctx: CancellationToken, msg: &OutboundMessage) -> Result<(), DeliveryError>;
}

/// Wires a `ResponseSender` directly onto a `Dispatcher`.
pub struct DispatcherSender(pub Arc<Dispatcher>);

#[async_trait]
impl ResponseSender for DispatcherSender {
    async fn send(&self, ctx: CancellationToken, msg: &OutboundMessage) -> Result<(), DeliveryError> {
        self.0.send(ctx, msg).await.map_err(DeliveryError::Dispatch)
    }
}

/// Optional durable history backend. The persistence key is derived from
/// the conversation key and is opaque to the core.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn append(&self, persistence_key: &str, turn: &Turn) -> Result<(), PersistError>;
    async fn get_recent(&self, persistence_key: &str, n: usize) -> Result<Vec<Turn>, PersistError>;
}
