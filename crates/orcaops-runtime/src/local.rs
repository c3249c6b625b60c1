//! A same-host, process-based [`RuntimeAdapter`] test double. It runs
//! `/bin/sh -c <command>` as a plain child process instead of inside a real
//! container — there is no isolation, no image pull, no network namespace.
//! It exists so the Job Runner and Workflow Runner can be exercised in unit
//! tests without a container engine, mirroring how
//! `original_source/test_docker_manager.py` fakes the Docker client rather
//! than talking to a real daemon.

use crate::adapter::{
    ByteStream, ContainerInspect, ContainerState, ExecHandle, ExecStreams, LogsOpts, RunOpts,
    RuntimeAdapter, Stats,
};
use crate::error::RuntimeError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::{Child, Command};

struct Container {
    image: String,
    env: HashMap<String, String>,
    network: Option<String>,
    removed: bool,
}

/// Image references containing this substring fail `run` with
/// `RuntimeError::ImageNotFound`, letting tests exercise the provisioning
/// failure path (§4.2 step 2) without a real registry.
pub const UNKNOWN_IMAGE_MARKER: &str = "does-not-exist";

#[derive(Default)]
pub struct LocalRuntime {
    containers: Mutex<HashMap<String, Container>>,
    networks: Mutex<HashMap<String, Vec<String>>>,
    pending_execs: Mutex<HashMap<String, Child>>,
    next_id: AtomicU64,
}

impl LocalRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{n:08x}")
    }
}

#[async_trait]
impl RuntimeAdapter for LocalRuntime {
    async fn run(&self, image: &str, opts: RunOpts) -> Result<String, RuntimeError> {
        if image.contains(UNKNOWN_IMAGE_MARKER) {
            return Err(RuntimeError::ImageNotFound(image.to_string()));
        }
        let cid = opts.name.clone().unwrap_or_else(|| self.fresh_id("cid"));
        self.containers.lock().unwrap().insert(
            cid.clone(),
            Container {
                image: image.to_string(),
                env: opts.environment,
                network: opts.network_name,
                removed: false,
            },
        );
        Ok(cid)
    }

    async fn exec(&self, cid: &str, argv: &[String], cwd: Option<&str>) -> Result<ExecStreams, RuntimeError> {
        let env = {
            let containers = self.containers.lock().unwrap();
            let container = containers
                .get(cid)
                .ok_or_else(|| RuntimeError::NotFound(cid.to_string()))?;
            if container.removed {
                return Err(RuntimeError::NotFound(cid.to_string()));
            }
            container.env.clone()
        };

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c");
        cmd.args(argv);
        cmd.envs(env);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.stdin(std::process::Stdio::null());

        let mut child = cmd.spawn().map_err(RuntimeError::from)?;
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let handle = ExecHandle(self.fresh_id("exec"));
        self.pending_execs
            .lock()
            .unwrap()
            .insert(handle.0.clone(), child);

        Ok(ExecStreams {
            handle,
            stdout: Box::pin(stdout),
            stderr: Box::pin(stderr),
        })
    }

    async fn inspect_exec(&self, handle: &ExecHandle) -> Result<i32, RuntimeError> {
        let mut child = self
            .pending_execs
            .lock()
            .unwrap()
            .remove(&handle.0)
            .ok_or_else(|| RuntimeError::NotFound(handle.0.clone()))?;
        let status = child.wait().await.map_err(RuntimeError::from)?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn logs(&self, _cid: &str, _opts: LogsOpts) -> Result<ByteStream, RuntimeError> {
        Ok(Box::pin(std::io::Cursor::new(Vec::new())))
    }

    async fn stop(&self, cid: &str, _timeout: Duration) -> Result<(), RuntimeError> {
        if !self.containers.lock().unwrap().contains_key(cid) {
            return Err(RuntimeError::NotFound(cid.to_string()));
        }
        Ok(())
    }

    async fn remove(&self, cid: &str, force: bool) -> Result<(), RuntimeError> {
        let mut containers = self.containers.lock().unwrap();
        match containers.get_mut(cid) {
            Some(c) => {
                c.removed = true;
                Ok(())
            }
            None if force => Ok(()),
            None => Err(RuntimeError::NotFound(cid.to_string())),
        }
    }

    async fn copy_from(&self, cid: &str, src_path: &str, dest_dir: &Path) -> Result<(), RuntimeError> {
        if !self.containers.lock().unwrap().contains_key(cid) {
            return Err(RuntimeError::NotFound(cid.to_string()));
        }
        let src = Path::new(src_path);
        let file_name = src
            .file_name()
            .ok_or_else(|| RuntimeError::ApiError(format!("no file name in {src_path:?}")))?;
        tokio::fs::create_dir_all(dest_dir).await.map_err(RuntimeError::from)?;
        tokio::fs::copy(src, dest_dir.join(file_name))
            .await
            .map_err(RuntimeError::from)?;
        Ok(())
    }

    async fn stats(&self, cid: &str) -> Result<Stats, RuntimeError> {
        if !self.containers.lock().unwrap().contains_key(cid) {
            return Err(RuntimeError::NotFound(cid.to_string()));
        }
        Ok(Stats::default())
    }

    async fn create_network(&self, name: &str, _labels: HashMap<String, String>) -> Result<String, RuntimeError> {
        let id = self.fresh_id("net");
        self.networks.lock().unwrap().insert(name.to_string(), Vec::new());
        Ok(id)
    }

    async fn connect_to_network(
        &self,
        cid: &str,
        network_id: &str,
        aliases: &[String],
    ) -> Result<(), RuntimeError> {
        if !self.containers.lock().unwrap().contains_key(cid) {
            return Err(RuntimeError::NotFound(cid.to_string()));
        }
        self.networks
            .lock()
            .unwrap()
            .entry(network_id.to_string())
            .or_default()
            .extend(aliases.iter().cloned());
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.networks.lock().unwrap().remove(name);
        Ok(())
    }

    async fn inspect_container(&self, cid: &str) -> Result<ContainerInspect, RuntimeError> {
        let containers = self.containers.lock().unwrap();
        let container = containers
            .get(cid)
            .ok_or_else(|| RuntimeError::NotFound(cid.to_string()))?;
        Ok(ContainerInspect {
            image_digest: Some(format!("sha256:{:x}", md5_stub(&container.image))),
            env_list: container
                .env
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect(),
            resource_limits: Default::default(),
            state: ContainerState {
                running: !container.removed,
                health: Some("none".to_string()),
            },
        })
    }
}

/// Deterministic, non-cryptographic stand-in for a registry digest so tests
/// have something stable to assert on; never used for anything security
/// sensitive.
fn md5_stub(input: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn run_then_exec_echo() {
        let rt = LocalRuntime::new();
        let cid = rt.run("alpine:3", RunOpts::default()).await.unwrap();
        let mut streams = rt
            .exec(&cid, &["echo hello".to_string()], None)
            .await
            .unwrap();
        let mut out = String::new();
        streams.stdout.read_to_string(&mut out).await.unwrap();
        let code = rt.inspect_exec(&streams.handle).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn unknown_image_fails_run() {
        let rt = LocalRuntime::new();
        let err = rt.run("does-not-exist:1", RunOpts::default()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::ImageNotFound(_)));
    }

    #[tokio::test]
    async fn exec_against_removed_container_is_not_found() {
        let rt = LocalRuntime::new();
        let cid = rt.run("alpine:3", RunOpts::default()).await.unwrap();
        rt.remove(&cid, true).await.unwrap();
        let err = rt
            .exec(&cid, &["echo hi".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::NotFound(_)));
    }

    #[tokio::test]
    async fn nonzero_exit_code_propagates() {
        let rt = LocalRuntime::new();
        let cid = rt.run("alpine:3", RunOpts::default()).await.unwrap();
        let streams = rt
            .exec(&cid, &["exit 7".to_string()], None)
            .await
            .unwrap();
        let code = rt.inspect_exec(&streams.handle).await.unwrap();
        assert_eq!(code, 7);
    }
}
