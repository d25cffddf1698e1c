pub mod contracts;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod pruner;
pub mod router;

pub use contracts::{AgentFactory, AgentLoop, DispatcherSender, ResponseSender, SessionPersistence};
pub use error::{AgentError, DeliveryError, PersistError, PipelineError, SubmitError};
pub use pipeline::{Envelope, Pipeline, PipelineOutcome};
pub use pool::WorkerPool;
pub use pruner::LazyPruner;
pub use router::Router;
