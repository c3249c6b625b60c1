//! Job Runner and Job Manager (§4.2, §4.3): executes a single `JobSpec`
//! inside a provisioned sandbox and owns concurrency-safe job lifecycle on
//! top of a [`orcaops_runtime::RuntimeAdapter`].

mod artifacts;
mod cancel;
mod env_capture;
mod manager;
mod persistence;
mod resource_usage;
mod runner;
mod stream;

pub use cancel::CancelSignal;
pub use manager::{JobManager, SubmitError};
pub use persistence::persist;
pub use runner::JobRunner;
