//! Reads a step's stdout/stderr to completion or a deadline, whichever comes
//! first (§9 "read until EOF or deadline ... select(stream_end, deadline)").
//! Non-UTF8 bytes are lossily decoded rather than rejected, matching
//! `subprocess.PIPE` + `decode(errors="replace")` in the original Python
//! implementation.

use crate::cancel::CancelSignal;
use orcaops_runtime::ByteStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, Notify};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    TimedOut,
    Cancelled,
}

pub struct StepOutput {
    pub stdout: String,
    pub stderr: String,
    pub outcome: StepOutcome,
}

async fn pump(mut stream: ByteStream, buf: Arc<Mutex<Vec<u8>>>, stop: Arc<Notify>) {
    let mut chunk = [0u8; 8192];
    loop {
        tokio::select! {
            read = stream.read(&mut chunk) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.lock().await.extend_from_slice(&chunk[..n]),
                }
            }
            _ = stop.notified() => break,
        }
    }
}

/// Drains `stdout`/`stderr` concurrently until both reach EOF, `timeout`
/// elapses, or `cancel` fires. Whichever loses the race is stopped and its
/// partial output is still returned.
pub async fn read_to_deadline(
    stdout: ByteStream,
    stderr: ByteStream,
    timeout: Duration,
    cancel: &CancelSignal,
) -> StepOutput {
    let stop = Arc::new(Notify::new());
    let out_buf = Arc::new(Mutex::new(Vec::new()));
    let err_buf = Arc::new(Mutex::new(Vec::new()));

    let out_task = tokio::spawn(pump(stdout, out_buf.clone(), stop.clone()));
    let err_task = tokio::spawn(pump(stderr, err_buf.clone(), stop.clone()));
    let both = futures::future::join(out_task, err_task);
    tokio::pin!(both);

    let outcome = tokio::select! {
        _ = &mut both => StepOutcome::Completed,
        _ = tokio::time::sleep(timeout) => StepOutcome::TimedOut,
        _ = cancel.cancelled() => StepOutcome::Cancelled,
    };

    if outcome != StepOutcome::Completed {
        stop.notify_waiters();
        let _ = both.await;
    }

    let stdout_bytes = out_buf.lock().await;
    let stderr_bytes = err_buf.lock().await;
    StepOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn byte_stream(data: &'static [u8]) -> ByteStream {
        Box::pin(Cursor::new(data))
    }

    #[tokio::test]
    async fn completes_before_deadline() {
        let cancel = CancelSignal::new();
        let out = read_to_deadline(byte_stream(b"hello"), byte_stream(b"world"), Duration::from_secs(5), &cancel).await;
        assert_eq!(out.stdout, "hello");
        assert_eq!(out.stderr, "world");
        assert_eq!(out.outcome, StepOutcome::Completed);
    }

    #[tokio::test]
    async fn cancel_stops_the_read() {
        // Duplex streams with the write half kept alive never reach EOF on
        // their own, so the only way this resolves is via cancellation.
        let (_out_writer, out_reader) = tokio::io::duplex(64);
        let (_err_writer, err_reader) = tokio::io::duplex(64);
        let cancel = CancelSignal::new();
        cancel.cancel();
        let out = read_to_deadline(Box::pin(out_reader), Box::pin(err_reader), Duration::from_secs(5), &cancel).await;
        assert_eq!(out.outcome, StepOutcome::Cancelled);
    }
}
