//! Thin filesystem helper used everywhere OrcaOps needs a durable write:
//! `run.json`, `workflow.json`, `baselines.json`, the anomaly/audit JSONL
//! files. Every durable write goes through [`Fs::write_atomic`], which writes
//! to a temp file in the same directory and renames over the target — the
//! write is visible to readers all-at-once or not at all.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Clone, Copy, Debug, Default)]
pub struct Fs;

impl Fs {
    pub fn new() -> Self {
        Self
    }

    pub fn create_dir_all(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::create_dir_all(path).with_context(|| format!("creating directory {}", path.display()))
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        path.as_ref().exists()
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }

    /// Writes `contents` to `path` by creating a sibling temp file and
    /// renaming it over `path`. The parent directory must already exist.
    pub fn write_atomic(&self, path: impl AsRef<Path>, contents: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        self.create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("creating temp file in {}", parent.display()))?;
        tmp.write_all(contents)
            .with_context(|| format!("writing temp file for {}", path.display()))?;
        tmp.flush()?;
        tmp.persist(path)
            .with_context(|| format!("renaming temp file onto {}", path.display()))?;
        Ok(())
    }

    /// Appends a single line to `path`, creating it (and its parent
    /// directory) if absent. Used for the `steps.jsonl`/`anomalies/*.jsonl`/
    /// `audit/*.jsonl` append-only logs.
    pub fn append_line(&self, path: impl AsRef<Path>, line: &str) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {} for append", path.display()))?;
        writeln!(file, "{line}").with_context(|| format!("appending to {}", path.display()))?;
        Ok(())
    }

    pub fn remove_dir_all(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing directory {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Fs::new();
        let path = dir.path().join("run.json");
        fs.write_atomic(&path, b"{\"a\":1}").unwrap();
        assert_eq!(fs.read_to_string(&path).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn atomic_write_overwrites_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Fs::new();
        let path = dir.path().join("run.json");
        fs.write_atomic(&path, b"first").unwrap();
        fs.write_atomic(&path, b"second").unwrap();
        assert_eq!(fs.read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn append_line_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let fs = Fs::new();
        let path = dir.path().join("nested").join("steps.jsonl");
        fs.append_line(&path, "{\"a\":1}").unwrap();
        fs.append_line(&path, "{\"a\":2}").unwrap();
        let contents = fs.read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
