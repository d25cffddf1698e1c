use thiserror::Error;

/// Errors a channel adapter may return from `send`/`send_stream`/`send_typing`.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Returned by the default implementation of an optional capability
    /// (`send_stream`, `send_typing`) that an adapter didn't override.
    #[error("capability not supported by this channel")]
    Unsupported,

    /// Platform reported the edit was a no-op (content unchanged). Streaming
    /// flush treats this as success, not a failure to count toward the
    /// consecutive-failure circuit breaker.
    #[error("message not modified")]
    NotModified,

    /// Platform rate-limited the request; retry after the given delay.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

/// Errors returned by the [`crate::dispatcher::Dispatcher`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("channel '{name}' is already registered")]
    DuplicateChannel { name: String },

    #[error("no channel registered under '{name}'")]
    UnknownChannel { name: String },

    #[error("channel '{name}' send failed: {source}")]
    Send {
        name: String,
        #[source]
        source: ChannelError,
    },
}
