use thiserror::Error;

/// Sentinel errors for the ambient config-loading layer. Library crates
/// elsewhere in the workspace define their own sentinel enums per §7; this
/// one belongs to `gwcore` alone since only config loading lives here.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration from {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: figment::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
