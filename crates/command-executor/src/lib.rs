//! Runtime-agnostic command execution library
//!
//! Runs external tools to completion from a discrete argument vector, with a
//! wall-clock limit, cooperative cancellation and bounded output capture.
//! A timed-out or cancelled run kills the whole process group before it
//! returns, and the raw exit status is always handed back to the caller.

#![warn(missing_docs)]

pub mod backends;
pub mod cancel;
pub mod command;
pub mod error;
pub mod launcher;
pub mod process;

pub use backends::LocalLauncher;
pub use cancel::CancellationToken;
pub use command::{Command, CommandBuilder};
pub use error::{Error, Result};
pub use launcher::Launcher;
pub use process::{DEFAULT_CAPTURE_LIMIT, ExitStatus, RunLimits, RunOutcome, RunOutput};
