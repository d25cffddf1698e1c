use std::collections::HashMap;
use std::sync::Arc;

use gwchannels::{InboundMessage, OutboundMessage};
use gwcore::SessionView;
use serde_json::Value;

/// The three points in the pipeline where a hook may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPosition {
    BeforeProcess,
    BeforeSend,
    AfterSend,
}

/// The decision a `before-process` hook returns to the engine.
///
/// Only meaningful at `BeforeProcess` — `BeforeSend` hooks mutate the
/// outbound in place instead and `Modify` there is purely informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Allow,
    Drop,
    Modify,
}

/// Per-position view a hook receives. The metadata map is shared across all
/// three positions for a single message; writes by an earlier hook are
/// visible to later hooks in the same pipeline execution.
pub enum HookContext<'a> {
    BeforeProcess {
        inbound: &'a InboundMessage,
        session: &'a SessionView,
        metadata: &'a mut HashMap<String, Value>,
    },
    BeforeSend {
        outbound: &'a mut OutboundMessage,
        session: &'a SessionView,
        metadata: &'a mut HashMap<String, Value>,
    },
    /// Owned, not borrowed — `after-send` hooks are spawned onto their own
    /// task and must outlive the pipeline call that fired them.
    AfterSend {
        outbound: OutboundMessage,
        session: SessionView,
        metadata: HashMap<String, Value>,
    },
}

/// A single extension point. Implementations must be cheap — `BeforeProcess`
/// and `BeforeSend` hooks run synchronously on the worker handling the
/// message.
pub trait Hook: Send + Sync {
    fn call(&self, ctx: &mut HookContext) -> Result<HookAction, crate::error::HookError>;
}

/// A registered hook binding a name, position, and priority to a handler.
pub struct HookDefinition {
    pub name: String,
    pub position: HookPosition,
    /// Lower runs first; ties broken by registration order.
    pub priority: i32,
    pub(crate) seq: u64,
    pub hook: Arc<dyn Hook>,
}
