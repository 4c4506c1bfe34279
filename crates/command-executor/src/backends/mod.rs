//! Backend implementations for different execution contexts
//!
//! Only local execution ships with this crate. Other contexts (and test
//! doubles) plug in by implementing the [`Launcher`](crate::Launcher) trait.
//!
//! # Example: Custom Launcher
//!
//! ```ignore
//! use async_trait::async_trait;
//! use command_executor::{CancellationToken, Command, Launcher, Result, RunLimits, RunOutput};
//!
//! struct DryRunLauncher;
//!
//! #[async_trait]
//! impl Launcher for DryRunLauncher {
//!     async fn run(&self, command: Command, _: RunLimits, _: &CancellationToken) -> Result<RunOutput> {
//!         // Log instead of executing
//!     }
//! }
//! ```

pub mod local;
pub use local::LocalLauncher;
