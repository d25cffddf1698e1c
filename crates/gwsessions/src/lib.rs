pub mod approval;
pub mod error;
pub mod lane;
pub mod store;
pub mod types;

pub use approval::{ApprovalManager, ApprovalResponse};
pub use error::SessionError;
pub use lane::{LaneGuard, LaneLock};
pub use store::SessionStore;
pub use types::{Session, DEFAULT_MAX_HISTORY_LEN};
