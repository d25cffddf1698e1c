pub mod error;
pub mod poller;

pub use error::TelegramError;
pub use poller::TelegramPoller;
