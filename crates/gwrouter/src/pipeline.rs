use std::collections::HashMap;
use std::sync::Arc;

use gwchannels::policy::GroupPolicy;
use gwchannels::typing::start_typing_loop;
use gwchannels::{ContentBlock, Dispatcher, InboundMessage, OutboundMessage};
use gwcore::{ConversationKey, Turn};
use gwhooks::{HookAction, HookEngine};
use gwsessions::{ApprovalManager, LaneLock, Session, SessionStore};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::contracts::{AgentFactory, ResponseSender, SessionPersistence};
use crate::error::{AgentError, PipelineError};
use crate::pruner::LazyPruner;

const TOO_MANY_SESSIONS: &str = "Too many active sessions. Please try again later.";
const AGENT_INIT_FAILED: &str = "Failed to initialize agent.";
const GENERIC_PROCESSING_ERROR: &str = "An error occurred while processing your message.";

/// An inbound message paired with the conversation key derived from it.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub inbound: InboundMessage,
    pub key: ConversationKey,
}

impl From<InboundMessage> for Envelope {
    fn from(inbound: InboundMessage) -> Self {
        let key = inbound.conversation_key();
        Self { inbound, key }
    }
}

/// Result of one pipeline execution.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub skipped: bool,
    pub error: Option<PipelineError>,
}

impl PipelineOutcome {
    fn skip() -> Self {
        Self { skipped: true, error: None }
    }

    fn ok() -> Self {
        Self { skipped: false, error: None }
    }

    fn err(error: PipelineError) -> Self {
        Self { skipped: false, error: Some(error) }
    }
}

/// Wires every subsystem the 13-step pipeline touches. Constructed once by
/// the router and shared (behind an `Arc`) across all workers.
pub struct Pipeline {
    pub store: Arc<SessionStore>,
    pub lanes: Arc<LaneLock<ConversationKey>>,
    pub hooks: Arc<HookEngine>,
    pub group_policy: GroupPolicy,
    pub dispatcher: Arc<Dispatcher>,
    pub agent_factory: Arc<dyn AgentFactory>,
    pub response_sender: Arc<dyn ResponseSender>,
    pub persistence: Option<Arc<dyn SessionPersistence>>,
    pub pruner: Arc<LazyPruner>,
    pub agent_id: String,
    pub max_history_len: usize,
}

impl Pipeline {
    pub async fn execute(&self, ctx: CancellationToken, envelope: Envelope) -> PipelineOutcome {
        let Envelope { inbound, key } = envelope;

        // 1. Log reception.
        info!(channel = %key.channel, chat = %key.chat_id, thread = %key.thread_id, "message received");

        // 2. Get or create the session. A CSPRNG failure minting a session id
        // is fatal, not a pipeline error — handing out a degraded identifier
        // is worse than aborting.
        let (session_opt, created) = self
            .store
            .get_or_create(&key, &self.agent_id)
            .expect("OS CSPRNG failed while minting a session id");
        let mut session = match session_opt {
            Some(s) => s,
            None => {
                self.send_notice(ctx.clone(), &inbound, TOO_MANY_SESSIONS).await;
                return PipelineOutcome::skip();
            }
        };
        if created {
            debug!(session = %session.id, key = %key, "session created");
        }

        // 3. Approval short-circuit safety net.
        if ApprovalManager::is_approval_response(&inbound).is_some() {
            warn!("approval response reached the pipeline; it should have been intercepted in submit");
        }

        // 4. Group policy.
        if !self.group_policy.should_process(&inbound) {
            return PipelineOutcome::skip();
        }

        // 5. Acquire the lane. The guard releases on every exit path below.
        let _lane_guard = self.lanes.acquire(&key).await;

        // 6. before-process hooks.
        let mut metadata: HashMap<String, Value> = HashMap::new();
        let action = self.hooks.run_before_process(&inbound, &session.view(), &mut metadata);
        if action == HookAction::Drop {
            return PipelineOutcome::skip();
        }

        // 7. Resolve the agent loop.
        let agent = match self.agent_factory.for_session(&session.view(), &inbound).await {
            Ok(a) => a,
            Err(e) => {
                self.send_notice(ctx.clone(), &inbound, AGENT_INIT_FAILED).await;
                return PipelineOutcome::err(PipelineError::AgentUnavailable(e));
            }
        };

        // 7b. Restore history for a freshly created session, if persistence is configured.
        if created {
            if let Some(persistence) = &self.persistence {
                let persistence_key = key.to_string();
                match persistence.get_recent(&persistence_key, self.max_history_len).await {
                    Ok(turns) => session.history = turns,
                    Err(e) => warn!(error = %e, "failed to restore session history"),
                }
            }
        }

        // 8. Append the user turn.
        let user_turn = Turn::user(inbound.text());
        session.push_turn(user_turn.clone(), self.max_history_len);
        if let Some(persistence) = &self.persistence {
            let persistence_key = key.to_string();
            if let Err(e) = persistence.append(&persistence_key, &user_turn).await {
                warn!(error = %e, "failed to persist user turn");
            }
        }

        // 9. Assemble the request.
        let system_prompt = self.agent_factory.soul_prompt(&session.view());
        let history = session.history.clone();

        // 9b. Typing indicator.
        let typing_ctx = ctx.child_token();
        let typing_handle = self.dispatcher.get(&inbound.channel).await.map(|channel| {
            start_typing_loop(typing_ctx.clone(), channel, inbound.chat.clone(), std::time::Duration::from_secs(0))
        });

        // 10. Invoke the agent.
        let response = agent.respond(ctx.clone(), &system_prompt, &history).await;
        typing_ctx.cancel();
        if let Some(handle) = typing_handle {
            let _ = handle.await;
        }
        let response_text = match response {
            Ok(text) => text,
            Err(e) => {
                self.send_notice(ctx.clone(), &inbound, GENERIC_PROCESSING_ERROR).await;
                self.store.put(session);
                return PipelineOutcome::err(PipelineError::AgentFailed(e));
            }
        };

        // 11. Build the outbound message and run before-send hooks.
        let mut outbound = OutboundMessage {
            channel: inbound.channel.clone(),
            chat: inbound.chat.clone(),
            thread_id: inbound.thread_id.clone(),
            reply_to_id: Some(inbound.id.clone()),
            blocks: vec![ContentBlock::text(response_text.clone())],
            hints: None,
        };
        self.hooks.run_before_send(&mut outbound, &session.view(), &mut metadata);

        // 12. Deliver.
        if let Err(e) = self.response_sender.send(ctx.clone(), &outbound).await {
            error!(error = %e, "failed to deliver response");
            self.store.put(session);
            return PipelineOutcome::err(PipelineError::DeliveryFailed(e));
        }

        // 13. Append the assistant turn, touch, persist, fire after-send hooks, opportunistic prune.
        let assistant_turn = Turn::assistant(response_text);
        session.push_turn(assistant_turn.clone(), self.max_history_len);
        let session_view = session.view();
        self.store.put(session);
        if let Some(persistence) = &self.persistence {
            let persistence_key = key.to_string();
            if let Err(e) = persistence.append(&persistence_key, &assistant_turn).await {
                warn!(error = %e, "failed to persist assistant turn");
            }
        }
        self.hooks.run_after_send(outbound, session_view, metadata);
        self.pruner.try_prune();

        PipelineOutcome::ok()
    }

    async fn send_notice(&self, ctx: CancellationToken, inbound: &InboundMessage, text: &str) {
        let notice = OutboundMessage {
            channel: inbound.channel.clone(),
            chat: inbound.chat.clone(),
            thread_id: inbound.thread_id.clone(),
            reply_to_id: Some(inbound.id.clone()),
            blocks: vec![ContentBlock::text(text)],
            hints: None,
        };
        if let Err(e) = self.response_sender.send(ctx, &notice).await {
            warn!(error = %e, "failed to deliver user-visible notice");
        }
    }
}
