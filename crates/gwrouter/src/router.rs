use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};

use chrono::Duration;
use gwchannels::policy::GroupPolicy;
use gwchannels::{Dispatcher, InboundMessage};
use gwcore::RouterConfig;
use gwhooks::HookEngine;
use gwsessions::{ApprovalManager, LaneLock, SessionStore};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::contracts::{AgentFactory, ResponseSender, SessionPersistence};
use crate::error::SubmitError;
use crate::pipeline::Envelope;
use crate::pipeline::Pipeline;
use crate::pool::WorkerPool;
use crate::pruner::{LazyPruner, DEFAULT_PRUNE_INTERVAL};

/// Wires the session store, lane lock, hook engine, dispatcher, and worker
/// pool behind `start`/`submit`/`stop`.
///
/// The agent factory and response sender are mandatory constructor
/// parameters rather than an `Option` validated at runtime — the type
/// system enforces what §4.12 calls "both required".
pub struct Router {
    pipeline: Arc<Pipeline>,
    pool: WorkerPool,
    approvals: Arc<ApprovalManager>,
    inbox_tx: StdRwLock<Option<mpsc::Sender<Envelope>>>,
    inbox_rx: AsyncMutex<Option<mpsc::Receiver<Envelope>>>,
    root_ctx: AsyncMutex<Option<CancellationToken>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

#[allow(clippy::too_many_arguments)]
impl Router {
    pub fn new(
        config: RouterConfig,
        store: Arc<SessionStore>,
        dispatcher: Arc<Dispatcher>,
        hooks: Arc<HookEngine>,
        group_policy: GroupPolicy,
        agent_factory: Arc<dyn AgentFactory>,
        response_sender: Arc<dyn ResponseSender>,
        persistence: Option<Arc<dyn SessionPersistence>>,
        agent_id: impl Into<String>,
    ) -> Self {
        let lanes = Arc::new(LaneLock::new());
        let pruner = Arc::new(LazyPruner::new(
            store.clone(),
            lanes.clone(),
            Duration::seconds(config.max_idle_secs as i64),
            DEFAULT_PRUNE_INTERVAL,
        ));
        let pipeline = Arc::new(Pipeline {
            store,
            lanes,
            hooks,
            group_policy,
            dispatcher,
            agent_factory,
            response_sender,
            persistence,
            pruner,
            agent_id: agent_id.into(),
            max_history_len: config.max_history_len,
        });
        let (tx, rx) = mpsc::channel(config.inbox_capacity.max(1));
        Self {
            pipeline,
            pool: WorkerPool::new(config.workers),
            approvals: Arc::new(ApprovalManager::new()),
            inbox_tx: StdRwLock::new(Some(tx)),
            inbox_rx: AsyncMutex::new(Some(rx)),
            root_ctx: AsyncMutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn approvals(&self) -> Arc<ApprovalManager> {
        self.approvals.clone()
    }

    /// Spins up the worker pool. Idempotent: a second call is a logged no-op,
    /// as is calling `start` after `stop`.
    pub async fn start(&self, ctx: CancellationToken) {
        if self.stopped.load(Ordering::SeqCst) {
            debug!("start called on a stopped router, ignoring");
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("router already started, ignoring duplicate start");
            return;
        }

        *self.root_ctx.lock().await = Some(ctx.clone());
        let rx = self.inbox_rx.lock().await.take().expect("inbox receiver already taken");
        let pipeline = self.pipeline.clone();
        self.pool
            .start(ctx, rx, move |worker_ctx, envelope: Envelope| {
                let pipeline = pipeline.clone();
                async move {
                    let outcome = pipeline.execute(worker_ctx, envelope).await;
                    if let Some(e) = outcome.error {
                        error!(error = %e, "pipeline execution failed");
                    }
                }
            })
            .await;
    }

    /// Non-blocking admission. Approval responses are resolved out-of-band
    /// here, bypassing the lane lock entirely, and never reach the inbox.
    pub fn submit(&self, msg: InboundMessage) -> Result<(), SubmitError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SubmitError::RouterStopped);
        }

        if let Some((id, response)) = ApprovalManager::is_approval_response(&msg) {
            if !self.approvals.resolve(&id, response) {
                warn!(approval_id = %id, "approval response for an unknown or already-resolved id");
            }
            return Ok(());
        }

        let envelope = Envelope::from(msg);
        let guard = self.inbox_tx.read().expect("inbox lock poisoned");
        let tx = guard.as_ref().ok_or(SubmitError::RouterStopped)?;
        tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::InboxFull,
            mpsc::error::TrySendError::Closed(_) => SubmitError::RouterStopped,
        })
    }

    /// Closes the inbox, cancels the root context, and waits for all workers
    /// to drain. Idempotent.
    pub async fn stop(&self, ctx: CancellationToken) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("router already stopped, ignoring duplicate stop");
            return;
        }

        self.inbox_tx.write().expect("inbox lock poisoned").take();
        if let Some(root) = self.root_ctx.lock().await.clone() {
            root.cancel();
        }
        ctx.cancel();
        self.pool.wait().await;
    }

    /// Runs the lazy pruner once, ignoring its own rate limit.
    pub fn prune_sessions(&self) -> usize {
        self.pipeline.pruner.try_prune()
    }
}
