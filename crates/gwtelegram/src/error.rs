use thiserror::Error;

/// Errors produced by the Telegram long-poll adapter.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram http request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("telegram api error: {description}")]
    Api { description: String },
}
