//! Process outcome types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-stream capture bound (1 MiB)
pub const DEFAULT_CAPTURE_LIMIT: usize = 1024 * 1024;

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// The process exited on its own
    Exited(ExitStatus),
    /// The time limit elapsed and the process tree was killed
    TimedOut,
    /// The caller cancelled and the process tree was killed
    Cancelled,
}

impl RunOutcome {
    /// Exit code, only present when the process exited on its own
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunOutcome::Exited(status) => status.code,
            RunOutcome::TimedOut | RunOutcome::Cancelled => None,
        }
    }

    /// True only for a normal exit with code 0
    pub fn success(&self) -> bool {
        matches!(self, RunOutcome::Exited(status) if status.success())
    }
}

/// Limits applied to a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Wall-clock limit before the process tree is killed
    pub timeout: Duration,
    /// Maximum bytes kept per output stream
    pub capture_limit: usize,
}

impl RunLimits {
    /// Limits with the given timeout and the default capture bound
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    /// Override the capture bound
    pub fn capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit = bytes;
        self
    }
}

/// Everything observed from a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// How the run ended
    pub outcome: RunOutcome,
    /// Captured stdout, at most `capture_limit` bytes
    pub stdout: Vec<u8>,
    /// Captured stderr, at most `capture_limit` bytes
    pub stderr: Vec<u8>,
    /// Stdout exceeded the capture bound
    pub stdout_truncated: bool,
    /// Stderr exceeded the capture bound
    pub stderr_truncated: bool,
    /// Time from spawn to reap
    pub duration: Duration,
}

impl RunOutput {
    /// An output with no captured bytes
    pub fn new(outcome: RunOutcome, duration: Duration) -> Self {
        Self {
            outcome,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            duration,
        }
    }

    /// Attach captured stderr
    pub fn with_stderr(mut self, stderr: impl Into<Vec<u8>>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Attach captured stdout
    pub fn with_stdout(mut self, stdout: impl Into<Vec<u8>>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Stdout as text, invalid UTF-8 replaced
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr as text, invalid UTF-8 replaced
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}
