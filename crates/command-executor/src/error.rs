//! Launcher errors
//!
//! These cover failures to run a command at all. A command that runs and
//! exits non-zero, times out, or is cancelled is not an error; it is reported
//! through [`RunOutcome`](crate::RunOutcome).

use std::io;
use thiserror::Error;

/// Why a command could not be run to completion
#[derive(Error, Debug)]
pub enum Error {
    /// The program does not exist or is not on `PATH`
    #[error("command not found: {command}")]
    CommandNotFound {
        /// Program as given to the launcher
        command: String,
    },

    /// The OS refused to start the process
    #[error("failed to spawn {command}: {source}")]
    SpawnFailed {
        /// Program as given to the launcher
        command: String,
        /// Underlying error
        source: io::Error,
    },

    /// The process group could not be signalled
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// Signal number, or -1 where the platform has no signals
        signal: i32,
        /// What the OS reported
        reason: String,
    },

    /// Reaping the child failed
    #[error("failed to wait for process: {0}")]
    WaitFailed(#[source] io::Error),
}

impl Error {
    /// Map a spawn-time I/O error, distinguishing a missing program
    pub fn from_spawn(command: &str, err: io::Error) -> Self {
        let command = command.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => Self::CommandNotFound { command },
            _ => Self::SpawnFailed {
                command,
                source: err,
            },
        }
    }

    pub(crate) fn signal_failed(signal: i32, reason: impl ToString) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.to_string(),
        }
    }

    /// Whether the program itself could not be found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::CommandNotFound { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
