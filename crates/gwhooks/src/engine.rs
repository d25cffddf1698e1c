use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use gwchannels::{InboundMessage, OutboundMessage};
use gwcore::SessionView;
use serde_json::Value;
use tracing::{error, warn};

use crate::types::{Hook, HookAction, HookContext, HookDefinition, HookPosition};

/// Central registry and dispatcher for `before-process` / `before-send` /
/// `after-send` hooks.
///
/// Cheap to share across the process behind an `Arc<HookEngine>`; execution
/// takes the read side of the registry lock since registration is rare.
pub struct HookEngine {
    hooks: RwLock<Vec<HookDefinition>>,
    next_seq: AtomicU64,
}

impl HookEngine {
    pub fn new() -> Self {
        Self { hooks: RwLock::new(Vec::new()), next_seq: AtomicU64::new(0) }
    }

    /// Registers a hook, re-sorting the registry by `(priority, insertion order)`.
    pub fn register(&self, name: impl Into<String>, position: HookPosition, priority: i32, hook: Arc<dyn Hook>) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let name = name.into();
        let mut hooks = self.hooks.write().expect("hook registry poisoned");
        hooks.push(HookDefinition { name: name.clone(), position, priority, seq, hook });
        hooks.sort_by_key(|h| (h.priority, h.seq));
        tracing::debug!(hook = %name, "hook registered");
    }

    pub fn unregister(&self, name: &str) {
        let mut hooks = self.hooks.write().expect("hook registry poisoned");
        hooks.retain(|h| h.name != name);
    }

    /// Runs `before-process` hooks in order. Returns `HookAction::Drop` if
    /// any hook short-circuits the message; hook errors are logged and do
    /// not stop execution.
    pub fn run_before_process(
        &self,
        inbound: &InboundMessage,
        session: &SessionView,
        metadata: &mut HashMap<String, Value>,
    ) -> HookAction {
        let hooks = self.hooks.read().expect("hook registry poisoned");
        for def in hooks.iter().filter(|h| h.position == HookPosition::BeforeProcess) {
            let mut ctx = HookContext::BeforeProcess { inbound, session, metadata };
            match def.hook.call(&mut ctx) {
                Ok(HookAction::Drop) => {
                    warn!(hook = %def.name, "before-process hook dropped message");
                    return HookAction::Drop;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(hook = %def.name, error = %e, "before-process hook failed");
                }
            }
        }
        HookAction::Allow
    }

    /// Runs `before-send` hooks in order. A hook may mutate `outbound` in
    /// place; `Modify` is purely informational. Errors are logged and never
    /// stop the pipeline.
    pub fn run_before_send(&self, outbound: &mut OutboundMessage, session: &SessionView, metadata: &mut HashMap<String, Value>) {
        let hooks = self.hooks.read().expect("hook registry poisoned");
        for def in hooks.iter().filter(|h| h.position == HookPosition::BeforeSend) {
            let mut ctx = HookContext::BeforeSend { outbound, session, metadata };
            if let Err(e) = def.hook.call(&mut ctx) {
                error!(hook = %def.name, error = %e, "before-send hook failed");
            }
        }
    }

    /// Fires `after-send` hooks fire-and-forget. Each hook gets its own
    /// owned snapshot of the context and its own spawned task; a panic or
    /// error in one never affects another or the caller.
    pub fn run_after_send(&self, outbound: OutboundMessage, session: SessionView, metadata: HashMap<String, Value>) {
        let hooks = self.hooks.read().expect("hook registry poisoned");
        for def in hooks.iter().filter(|h| h.position == HookPosition::AfterSend) {
            let hook = Arc::clone(&def.hook);
            let name = def.name.clone();
            let mut ctx = HookContext::AfterSend { outbound: outbound.clone(), session: session.clone(), metadata: metadata.clone() };
            tokio::spawn(async move {
                if let Err(e) = hook.call(&mut ctx) {
                    error!(hook = %name, error = %e, "after-send hook failed");
                }
            });
        }
    }
}

impl Default for HookEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HookError;
    use chrono::Utc;
    use gwcore::ConversationKey;

    struct DropHook;
    impl Hook for DropHook {
        fn call(&self, ctx: &mut HookContext) -> Result<HookAction, HookError> {
            if let HookContext::BeforeProcess { metadata, .. } = ctx {
                metadata.insert("seen".into(), Value::Bool(true));
            }
            Ok(HookAction::Drop)
        }
    }

    struct MutateHook;
    impl Hook for MutateHook {
        fn call(&self, ctx: &mut HookContext) -> Result<HookAction, HookError> {
            if let HookContext::BeforeSend { outbound, .. } = ctx {
                outbound.blocks.push(gwchannels::ContentBlock::text("appended"));
            }
            Ok(HookAction::Modify)
        }
    }

    fn session() -> SessionView {
        SessionView::new("s1".into(), ConversationKey::new("test", "c1", ""), "main".into(), Utc::now(), HashMap::new())
    }

    fn inbound() -> InboundMessage {
        InboundMessage {
            id: "m1".into(),
            timestamp: Utc::now(),
            channel: "test".into(),
            sender: gwchannels::Sender { id: "alice".into(), username: None, display_name: None },
            chat: gwchannels::Chat { id: "c1".into(), chat_type: gwchannels::ChatType::Dm, title: None },
            thread_id: None,
            reply_to_id: None,
            blocks: vec![gwchannels::ContentBlock::text("hi")],
            mentions: None,
            raw: Value::Null,
        }
    }

    fn outbound() -> OutboundMessage {
        OutboundMessage {
            channel: "test".into(),
            chat: gwchannels::Chat { id: "c1".into(), chat_type: gwchannels::ChatType::Dm, title: None },
            thread_id: None,
            reply_to_id: None,
            blocks: vec![gwchannels::ContentBlock::text("reply")],
            hints: None,
        }
    }

    #[test]
    fn before_process_drop_short_circuits() {
        let engine = HookEngine::new();
        engine.register("drop-all", HookPosition::BeforeProcess, 0, Arc::new(DropHook));
        let session = session();
        let inbound = inbound();
        let mut metadata = HashMap::new();
        let action = engine.run_before_process(&inbound, &session, &mut metadata);
        assert_eq!(action, HookAction::Drop);
        assert_eq!(metadata.get("seen"), Some(&Value::Bool(true)));
    }

    #[test]
    fn before_send_hook_mutates_outbound() {
        let engine = HookEngine::new();
        engine.register("mutate", HookPosition::BeforeSend, 0, Arc::new(MutateHook));
        let session = session();
        let mut outbound = outbound();
        let mut metadata = HashMap::new();
        engine.run_before_send(&mut outbound, &session, &mut metadata);
        assert_eq!(outbound.blocks.len(), 2);
    }

    #[test]
    fn hooks_run_in_priority_then_registration_order() {
        use std::sync::Mutex;

        struct RecordingHook(&'static str, Arc<Mutex<Vec<&'static str>>>);
        impl Hook for RecordingHook {
            fn call(&self, _ctx: &mut HookContext) -> Result<HookAction, HookError> {
                self.1.lock().unwrap().push(self.0);
                Ok(HookAction::Allow)
            }
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        let engine = HookEngine::new();
        engine.register("second", HookPosition::BeforeProcess, 5, Arc::new(RecordingHook("second", order.clone())));
        engine.register("first", HookPosition::BeforeProcess, 1, Arc::new(RecordingHook("first", order.clone())));
        engine.register("third-same-priority-a", HookPosition::BeforeProcess, 5, Arc::new(RecordingHook("third-a", order.clone())));

        let session = session();
        let inbound = inbound();
        let mut metadata = HashMap::new();
        engine.run_before_process(&inbound, &session, &mut metadata);

        let recorded = order.lock().unwrap().clone();
        assert_eq!(recorded, vec!["first", "second", "third-a"]);
    }
}
