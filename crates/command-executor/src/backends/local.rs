//! Local process execution backend

use async_io::Timer;
use async_process::Stdio;
use async_trait::async_trait;
use futures_lite::future;
use futures_lite::io::{AsyncRead, AsyncReadExt};
use std::io;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::launcher::Launcher;
use crate::process::{ExitStatus, RunLimits, RunOutcome, RunOutput};

const READ_CHUNK: usize = 8 * 1024;

/// Launcher for executing processes locally
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncher;

/// Output captured from one stream, bounded by the run's capture limit
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let room = limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
}

enum Race {
    Finished(io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl Launcher for LocalLauncher {
    async fn run(
        &self,
        command: Command,
        limits: RunLimits,
        cancel: &CancellationToken,
    ) -> Result<RunOutput> {
        if cancel.is_cancelled() {
            debug!(command = %command, "cancelled before spawn");
            return Ok(RunOutput::new(RunOutcome::Cancelled, Duration::ZERO));
        }

        let program = command.get_program().to_string_lossy().into_owned();
        let mut async_cmd = command.prepare();
        async_cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = async_cmd
            .spawn()
            .map_err(|e| Error::from_spawn(&program, e))?;
        let pid = child.id();
        debug!(pid, command = %command, timeout = ?limits.timeout, "spawned");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut out = Captured::default();
        let mut err = Captured::default();

        let race = {
            let finished = async {
                let (status, _) = future::zip(
                    child.status(),
                    future::zip(
                        drain(stdout, limits.capture_limit, &mut out),
                        drain(stderr, limits.capture_limit, &mut err),
                    ),
                )
                .await;
                Race::Finished(status)
            };
            let timed_out = async {
                Timer::after(limits.timeout).await;
                Race::TimedOut
            };
            let cancelled = async {
                cancel.cancelled().await;
                Race::Cancelled
            };
            future::or(finished, future::or(cancelled, timed_out)).await
        };

        let outcome = match race {
            Race::Finished(status) => {
                let status = status.map_err(Error::WaitFailed)?;
                RunOutcome::Exited(ExitStatus::from(status))
            }
            Race::TimedOut => {
                warn!(pid, command = %command, timeout = ?limits.timeout, "time limit exceeded, killing process group");
                kill_tree(&mut child, pid).await?;
                RunOutcome::TimedOut
            }
            Race::Cancelled => {
                warn!(pid, command = %command, "cancelled, killing process group");
                kill_tree(&mut child, pid).await?;
                RunOutcome::Cancelled
            }
        };

        let duration = started.elapsed();
        debug!(pid, ?outcome, duration_ms = duration.as_millis() as u64, "process finished");

        Ok(RunOutput {
            outcome,
            stdout: out.bytes,
            stderr: err.bytes,
            stdout_truncated: out.truncated,
            stderr_truncated: err.truncated,
            duration,
        })
    }
}

/// Read a stream to EOF, keeping at most `limit` bytes.
///
/// Bytes past the limit are still read so the child never blocks on a full pipe.
async fn drain<R>(reader: Option<R>, limit: usize, sink: &mut Captured)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };

    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => sink.push(&chunk[..n], limit),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "stopped reading child output");
                break;
            }
        }
    }
}

/// Kill the child's process group, then reap the child.
async fn kill_tree(child: &mut async_process::Child, pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        match signal::killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => return Err(Error::signal_failed(Signal::SIGKILL as i32, e)),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        child
            .kill()
            .map_err(|e| Error::signal_failed(-1, e))?;
    }

    child.status().await.map_err(Error::WaitFailed)?;
    Ok(())
}
