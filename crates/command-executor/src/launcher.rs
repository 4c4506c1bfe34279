//! Launcher trait for executing commands to completion

use crate::cancel::CancellationToken;
use crate::command::Command;
use crate::error::Result;
use crate::process::{RunLimits, RunOutput};
use async_trait::async_trait;

/// A launcher runs a command to completion under time and capture limits.
///
/// Implementations must never collapse the exit status into a boolean and
/// must terminate the process tree before returning a
/// [`TimedOut`](crate::RunOutcome::TimedOut) or
/// [`Cancelled`](crate::RunOutcome::Cancelled) outcome.
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    /// Run `command`, returning once the process has exited or been killed.
    ///
    /// `Err` is reserved for failures to start or reap the process.
    async fn run(
        &self,
        command: Command,
        limits: RunLimits,
        cancel: &CancellationToken,
    ) -> Result<RunOutput>;
}

#[async_trait]
impl<L: Launcher + ?Sized> Launcher for std::sync::Arc<L> {
    async fn run(
        &self,
        command: Command,
        limits: RunLimits,
        cancel: &CancellationToken,
    ) -> Result<RunOutput> {
        (**self).run(command, limits, cancel).await
    }
}
