//! Collects declared artifacts out of a finished sandbox (§4.2 step 4).
//!
//! For each `JobSpec.artifacts` entry, runs
//! `find <shell-quoted pattern> -maxdepth 0 -print0` inside the sandbox and
//! splits the NUL-separated output into resolved paths, each copied out via
//! `RuntimeAdapter::copy_from`. Quoting the pattern before handing it to
//! `find` means a glob character like `*` is never expanded by the shell —
//! `find` receives it as a literal starting path. A pattern with a real
//! wildcard in it therefore resolves to nothing unless a file with that
//! literal name exists. This mirrors `original_source/orcaops/job_runner.py`,
//! which has the identical quirk; it is a known limitation, not a bug
//! introduced here.

use crate::cancel::CancelSignal;
use crate::stream::{read_to_deadline, StepOutcome};
use orcaops_base::{ArtifactMetadata, ARTIFACT_HASH_ERROR};
use orcaops_runtime::RuntimeAdapter;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

/// Internal bound on how long the `find` probe is allowed to run; not
/// exposed to callers since artifact globs are expected to resolve quickly.
const FIND_TIMEOUT: Duration = Duration::from_secs(30);

fn artifact_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

async fn resolve_paths(runtime: &dyn RuntimeAdapter, cid: &str, pattern: &str) -> Vec<String> {
    let command = format!("find {} -maxdepth 0 -print0", shell_words::quote(pattern));
    let Ok(streams) = runtime.exec(cid, &[command], None).await else {
        return Vec::new();
    };
    let never_cancel = CancelSignal::new();
    let output = read_to_deadline(streams.stdout, streams.stderr, FIND_TIMEOUT, &never_cancel).await;
    if output.outcome != StepOutcome::Completed {
        return Vec::new();
    }
    if runtime.inspect_exec(&streams.handle).await.map(|code| code != 0).unwrap_or(true) {
        return Vec::new();
    }
    output
        .stdout
        .split('\0')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn hash_file(path: &Path) -> Option<(u64, String)> {
    let bytes = tokio::fs::read(path).await.ok()?;
    let size_bytes = bytes.len() as u64;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Some((size_bytes, hex::encode(hasher.finalize())))
}

/// An unresolved glob is not an error (§4.2 edge cases); a path that
/// resolves but fails to copy or hash is recorded with the error sentinel
/// rather than failing the job.
pub async fn collect_artifacts(runtime: &dyn RuntimeAdapter, cid: &str, patterns: &[String], dest_dir: &Path) -> Vec<ArtifactMetadata> {
    let mut out = Vec::new();
    for pattern in patterns {
        for resolved in resolve_paths(runtime, cid, pattern).await {
            let name = artifact_name(&resolved);
            let metadata = match runtime.copy_from(cid, &resolved, dest_dir).await {
                Ok(()) => match hash_file(&dest_dir.join(&name)).await {
                    Some((size_bytes, sha256)) => ArtifactMetadata { name: name.clone(), path: name, size_bytes, sha256 },
                    None => ArtifactMetadata { name: name.clone(), path: name, size_bytes: 0, sha256: ARTIFACT_HASH_ERROR.to_string() },
                },
                Err(_) => ArtifactMetadata { name: name.clone(), path: name, size_bytes: 0, sha256: ARTIFACT_HASH_ERROR.to_string() },
            };
            out.push(metadata);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use orcaops_runtime::{LocalRuntime, RunOpts};

    #[tokio::test]
    async fn unresolved_glob_yields_no_artifacts() {
        let runtime = LocalRuntime::new();
        let cid = runtime.run("alpine:3", RunOpts::default()).await.unwrap();
        let dest = tempfile::tempdir().unwrap();
        let artifacts = collect_artifacts(&runtime, &cid, &["/no/such/glob-*.txt".to_string()], dest.path()).await;
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn literal_existing_path_is_hashed() {
        let runtime = LocalRuntime::new();
        let cid = runtime.run("alpine:3", RunOpts::default()).await.unwrap();

        let src_dir = tempfile::tempdir().unwrap();
        let src_path = src_dir.path().join("out.txt");
        tokio::fs::write(&src_path, b"artifact contents").await.unwrap();

        let dest = tempfile::tempdir().unwrap();
        let artifacts = collect_artifacts(&runtime, &cid, &[src_path.to_string_lossy().into_owned()], dest.path()).await;
        assert_eq!(artifacts.len(), 1);
        assert_ne!(artifacts[0].sha256, ARTIFACT_HASH_ERROR);
        assert_eq!(artifacts[0].size_bytes, "artifact contents".len() as u64);
    }

    #[test]
    fn quoting_escapes_embedded_single_quotes() {
        assert_eq!(shell_words::quote("it's"), r"'it'\''s'");
    }
}
