use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long to wait for the capture pipes to drain once the process group is gone
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(1);
const READ_CHUNK: usize = 8192;

/// Raw result of one command, before any language-specific classification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed, by us or by a signal
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Runs a single command line with a wall-clock deadline.
///
/// The child is placed in its own process group. On timeout the whole group
/// is killed, and after a normal exit any stragglers left in the group are
/// killed too so they cannot keep the capture pipes open. A nonzero exit is
/// reported as data, never as an error.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    output_limit: usize,
}

impl ProcessRunner {
    pub fn new(output_limit: usize) -> Self {
        Self { output_limit }
    }

    pub async fn run(&self, command: &[String], cwd: &Path, deadline: Duration) -> Result<ProcessOutput> {
        let Some((program, args)) = command.split_first() else {
            bail!("Empty command");
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn `{program}`"))?;
        let pgid = child.id();
        // kill_on_drop only reaches the leader; this covers the rest of the group
        let group = GroupGuard(pgid);

        let stdout = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(read_capped(pipe, self.output_limit)));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(read_capped(pipe, self.output_limit)));

        let (exit_code, timed_out) = match timeout(deadline, child.wait()).await {
            Ok(status) => {
                let status = status.context("Failed to wait for child process")?;
                (status.code(), false)
            }
            Err(_) => {
                log::debug!("`{program}` exceeded {deadline:?}, killing process group {pgid:?}");
                match pgid {
                    Some(pgid) => kill_group(pgid),
                    None => child.start_kill()?,
                }
                let _ = child.wait().await;
                (None, true)
            }
        };

        // clears stragglers now that the leader is gone
        drop(group);

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;

        Ok(ProcessOutput {
            stdout: decode_capped(&stdout, self.output_limit),
            stderr: decode_capped(&stderr, self.output_limit),
            exit_code,
            timed_out,
        })
    }
}

/// Reads a pipe to EOF, keeping at most `limit` bytes.
///
/// Reading continues past the limit so the child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Vec<u8> {
    let mut kept = Vec::with_capacity(limit.min(READ_CHUNK));
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    kept
}

async fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(mut handle) = handle else {
        return Vec::new();
    };
    match timeout(PIPE_DRAIN_GRACE, &mut handle).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            log::warn!("Output reader failed: {e}");
            Vec::new()
        }
        Err(_) => {
            // something outside the process group still holds the pipe
            handle.abort();
            log::warn!("Output pipe still open after the process group was killed");
            Vec::new()
        }
    }
}

/// Kills the process group when dropped, including when the surrounding
/// future is abandoned mid-run.
struct GroupGuard(Option<u32>);

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.0.take() {
            kill_group(pgid);
        }
    }
}

fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // ESRCH once the group is empty, which is the common case after a clean exit
    let _ = unsafe { libc::kill(-pgid, libc::SIGKILL) };
}

/// Decodes captured bytes lossily, never returning more than `limit` bytes.
pub fn decode_capped(bytes: &[u8], limit: usize) -> String {
    let bytes = &bytes[..bytes.len().min(limit)];
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= limit {
        return text.into_owned();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
