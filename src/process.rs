//! Helpers for running toolchain processes with timeouts and bounded output.

use anyhow::{anyhow, Context, Result};
use std::io;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

/// How long output readers may keep draining after the child was reaped.
///
/// Descendants that left the process group can keep the pipes open; the
/// readers are abandoned once this slack runs out so the batch never hangs.
/// Whatever they had read by then is kept.
pub const DRAIN_SLACK: Duration = Duration::from_secs(2);

/// Captured output of one toolchain invocation.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Exit code, or `None` when the process was terminated by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Bytes kept from one output stream, shared with its reader task.
#[derive(Debug, Default)]
struct Capture {
    kept: Vec<u8>,
    truncated: usize,
}

type SharedCapture = Arc<Mutex<Capture>>;

/// Returns true if the error chain bottoms out in a "program not found".
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
    })
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount
/// of stdout/stderr kept in memory; the rest is drained and counted. The child runs in its
/// own process group, and the whole group is killed once the child exits or times out, so
/// background processes it left behind never outlive it.
pub async fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    log::trace!("spawning {:?}", cmd);
    let mut cmd = tokio::process::Command::from(cmd);
    cmd.kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn().context("spawn command")?;
    // `id()` is gone once the child is reaped; the group id is needed after that.
    let pgid = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_capture = SharedCapture::default();
    let stderr_capture = SharedCapture::default();
    let stdout_handle = tokio::spawn(read_stream_limited(
        stdout,
        output_limit_bytes,
        stdout_capture.clone(),
    ));
    let stderr_handle = tokio::spawn(read_stream_limited(
        stderr,
        output_limit_bytes,
        stderr_capture.clone(),
    ));

    let mut timed_out = false;
    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status.context("wait for command")?,
        Err(_) => {
            log::warn!(
                "command timed out after {}ms, killing",
                timeout.as_millis()
            );
            timed_out = true;
            if let Some(pgid) = pgid {
                kill_process_group(pgid);
            }
            if let Err(e) = child.kill().await {
                log::debug!("kill after timeout failed: {}", e);
            }
            child.wait().await.context("wait command after kill")?
        }
    };
    let duration = start.elapsed();

    // Reap anything the snippet left running in the background.
    if let Some(pgid) = pgid {
        kill_process_group(pgid);
    }

    let (stdout, stdout_truncated) = join_output(stdout_handle, &stdout_capture).await;
    let (stderr, stderr_truncated) = join_output(stderr_handle, &stderr_capture).await;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        log::debug!(
            "output truncated (stdout: {} bytes, stderr: {} bytes)",
            stdout_truncated,
            stderr_truncated
        );
    }

    log::trace!("command finished: {:?}, timed_out={}", status.code(), timed_out);
    Ok(CommandOutput {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        stdout_truncated,
        stderr_truncated,
        timed_out,
        duration,
    })
}

/// Kill every process in the group led by `pid` so orphans of the snippet
/// do not outlive it.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        // The group is already empty.
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => log::debug!("killpg({}) failed: {}", pid, e),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

async fn join_output(
    mut handle: JoinHandle<io::Result<()>>,
    capture: &SharedCapture,
) -> (Vec<u8>, usize) {
    match tokio::time::timeout(DRAIN_SLACK, &mut handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => log::debug!("output reader failed: {}", e),
        Ok(Err(e)) => log::debug!("output reader task failed: {}", e),
        Err(_) => {
            log::debug!("output reader still blocked after drain slack, abandoning");
            handle.abort();
        }
    }

    match capture.lock() {
        Ok(mut capture) => (std::mem::take(&mut capture.kept), capture.truncated),
        Err(_) => (Vec::new(), 0),
    }
}

async fn read_stream_limited<R>(
    mut reader: R,
    limit: usize,
    capture: SharedCapture,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let Ok(mut captured) = capture.lock() else {
            break;
        };
        let room = limit.saturating_sub(captured.kept.len());
        let take = room.min(n);
        captured.kept.extend_from_slice(&buf[..take]);
        captured.truncated += n - take;
    }

    Ok(())
}
