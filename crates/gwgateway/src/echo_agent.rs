//! Documented example agent factory: echoes the user's last message back
//! verbatim. Stands in for a real LLM-backed `AgentLoop`, which this core
//! treats as an external collaborator (see the agent contract in `gwrouter`).

use std::sync::Arc;

use async_trait::async_trait;
use gwchannels::InboundMessage;
use gwcore::{SessionView, Turn};
use gwrouter::{AgentError, AgentFactory, AgentLoop};
use tokio_util::sync::CancellationToken;

pub struct EchoAgentFactory;

#[async_trait]
impl AgentFactory for EchoAgentFactory {
    async fn for_session(&self, _session: &SessionView, _inbound: &InboundMessage) -> Result<Arc<dyn AgentLoop>, AgentError> {
        Ok(Arc::new(EchoAgentLoop))
    }
}

struct EchoAgentLoop;

#[async_trait]
impl AgentLoop for EchoAgentLoop {
    async fn respond(&self, _ctx: CancellationToken, _system_prompt: &str, history: &[Turn]) -> Result<String, AgentError> {
        let last = history.last().map(|t| t.content.as_str()).unwrap_or("");
        Ok(format!("echo: {last}"))
    }
}
