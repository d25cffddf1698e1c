pub mod allow;
pub mod channel;
pub mod chunk;
pub mod dispatcher;
pub mod error;
pub mod policy;
pub mod streaming;
pub mod typing;
pub mod types;

pub use allow::AllowList;
pub use channel::{Channel, InboxError, InboxSubmit};
pub use chunk::{split, ChunkOptions};
pub use dispatcher::Dispatcher;
pub use error::{ChannelError, DispatchError};
pub use policy::{GroupPolicy, GroupPolicyMode};
pub use streaming::{StreamTransport, StreamingSender};
pub use typing::start_typing_loop;
pub use types::{
    Chat, ChatType, ContentBlock, Hints, InboundMessage, Mentions, OutboundMessage, Sender,
};
