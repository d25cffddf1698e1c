use thiserror::Error;

/// Admission-rejected: returned synchronously from `Router::submit`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("router is stopped")]
    RouterStopped,
    #[error("inbox is full")]
    InboxFull,
}

/// Raised by an `AgentFactory` or `AgentLoop`.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent unavailable: {0}")]
    Unavailable(String),
    #[error("agent failed: {0}")]
    Failed(String),
}

/// Raised by a `SessionPersistence` implementation. Always best-effort from
/// the pipeline's perspective — logged, never propagated.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("session persistence failed: {0}")]
    Failed(String),
}

/// delivery-failed: the response-sender could not deliver the outbound message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Dispatch(#[from] gwchannels::DispatchError),
}

/// The three propagating error categories a pipeline execution can end in:
/// agent-unavailable, agent-failed, delivery-failed. cap-reached and
/// policy-skip are not errors — they surface as `PipelineOutcome::skipped`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("agent unavailable")]
    AgentUnavailable(#[source] AgentError),
    #[error("agent failed")]
    AgentFailed(#[source] AgentError),
    #[error("delivery failed")]
    DeliveryFailed(#[source] DeliveryError),
}
