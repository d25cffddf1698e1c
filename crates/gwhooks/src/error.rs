use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook execution failed: {0}")]
    ExecutionFailed(String),
}

pub type Result<T> = std::result::Result<T, HookError>;
