use crate::error::RuntimeError;
use async_trait::async_trait;
use orcaops_base::ResourceLimits;
use std::collections::HashMap;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncRead;

/// Opaque handle to an in-flight `exec`, returned by [`RuntimeAdapter::exec`]
/// and later passed to [`RuntimeAdapter::inspect_exec`] to retrieve the exit
/// code once the command's streams have been fully consumed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExecHandle(pub String);

#[derive(Clone, Debug, Default)]
pub struct RunOpts {
    pub detach: bool,
    pub command_override: Option<Vec<String>>,
    pub environment: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub network_name: Option<String>,
    pub name: Option<String>,
    pub resource_limits: ResourceLimits,
}

#[derive(Clone, Debug, Default)]
pub struct LogsOpts {
    pub follow: bool,
    pub timestamps: bool,
    pub tail: Option<u32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Stats {
    pub cpu_usage_ns: u64,
    pub memory_max_bytes: u64,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
    pub blkio_read_bytes: u64,
    pub blkio_write_bytes: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ContainerState {
    pub running: bool,
    /// `Health.Status` as reported by the runtime: `"healthy"`, `"unhealthy"`,
    /// `"starting"`, or `"none"` when no healthcheck is configured.
    pub health: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ContainerInspect {
    pub image_digest: Option<String>,
    pub env_list: Vec<String>,
    pub resource_limits: ResourceLimits,
    pub state: ContainerState,
}

/// Boxed, pinned, `Send` byte stream — what `exec`/`logs` hand back for the
/// caller to demultiplex and read until EOF or a deadline, whichever comes
/// first (§9 "select(stream_end, deadline)").
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

pub struct ExecStreams {
    pub handle: ExecHandle,
    pub stdout: ByteStream,
    pub stderr: ByteStream,
}

/// Thin capability surface the rest of the system consumes; a concrete
/// Docker/OCI client is an external collaborator (§1) that implements this
/// trait. [`crate::local::LocalRuntime`] is a same-host process-based test
/// double, not a production backend.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    async fn run(&self, image: &str, opts: RunOpts) -> Result<String, RuntimeError>;

    async fn exec(&self, cid: &str, argv: &[String], cwd: Option<&str>) -> Result<ExecStreams, RuntimeError>;

    async fn inspect_exec(&self, handle: &ExecHandle) -> Result<i32, RuntimeError>;

    async fn logs(&self, cid: &str, opts: LogsOpts) -> Result<ByteStream, RuntimeError>;

    async fn stop(&self, cid: &str, timeout: Duration) -> Result<(), RuntimeError>;

    async fn remove(&self, cid: &str, force: bool) -> Result<(), RuntimeError>;

    async fn copy_from(&self, cid: &str, src_path: &str, dest_dir: &Path) -> Result<(), RuntimeError>;

    async fn stats(&self, cid: &str) -> Result<Stats, RuntimeError>;

    async fn create_network(&self, name: &str, labels: HashMap<String, String>) -> Result<String, RuntimeError>;

    async fn connect_to_network(
        &self,
        cid: &str,
        network_id: &str,
        aliases: &[String],
    ) -> Result<(), RuntimeError>;

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError>;

    async fn inspect_container(&self, cid: &str) -> Result<ContainerInspect, RuntimeError>;
}

/// Labels this system stamps on every container/network it creates (§6).
pub mod labels {
    pub const JOB_ID: &str = "orcaops.job_id";
    pub const TTL: &str = "orcaops.ttl";
    pub const CREATED_AT: &str = "orcaops.created_at";
    pub const WORKFLOW_ID: &str = "orcaops.workflow_id";
    pub const SERVICE: &str = "orcaops.service";
}
