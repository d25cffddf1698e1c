pub mod config;
pub mod error;
pub mod types;

pub use config::{GatewayConfig, LoggingConfig, RouterConfig, TelegramConfig};
pub use error::{ConfigError, Result};
pub use types::{ConversationKey, Role, SessionView, Turn};
