use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The OS CSPRNG failed while minting a new session id. Treated as
    /// fatal: handing out a degraded identifier is worse than aborting.
    #[error("failed to generate a session id: {0}")]
    IdGeneration(#[from] getrandom::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
