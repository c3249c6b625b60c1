//! Capability surface over a container runtime (§4.1): run/exec/logs/
//! stop/rm/stats/inspect/network-create/copy-from. The concrete production
//! backend (a Docker/OCI client) is an external collaborator; this crate
//! defines the trait and a local-process test double.

pub mod adapter;
pub mod error;
pub mod local;

pub use adapter::{
    labels, ByteStream, ContainerInspect, ContainerState, ExecHandle, ExecStreams, LogsOpts,
    RunOpts, RuntimeAdapter, Stats,
};
pub use error::RuntimeError;
pub use local::LocalRuntime;
