//! # Provisioning orchestration
//!
//! Sequences destructive, externally executed provisioning operations
//! (image capture and restore, partitioning, filesystem creation, mounts,
//! LVM volume changes, network-boot configuration) against physical devices.
//!
//! Every request goes through the same pipeline: validate, take scoped
//! device locks, run the external tool through a [`Launcher`], classify the
//! outcome, release the locks, report an [`OperationResult`]. Operation
//! failures are never returned as `Err`; they are values of the closed
//! [`ErrorKind`] taxonomy.
//!
//! ## Example
//!
//! ```rust,no_run
//! use command_executor::LocalLauncher;
//! use provisioning_orchestration::{OperationRequest, Orchestrator, OrchestratorConfig};
//!
//! # async fn example() -> provisioning_orchestration::Result<()> {
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default(), LocalLauncher)?;
//!
//! let result = orchestrator
//!     .execute(OperationRequest::CreatePartition {
//!         device: "/dev/sdb".to_string(),
//!         partition_type: "primary".to_string(),
//!         size_mb: 1024,
//!     })
//!     .await;
//!
//! if !result.succeeded() {
//!     eprintln!("{:?}: {}", result.error_kind(), result.stderr_excerpt());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod boot;
mod classify;
mod config;
mod device;
mod locks;
mod operation;
mod orchestrator;
mod result;
mod state;
mod validate;

pub use classify::{ErrorKind, ToolFailure, classify};
pub use command_executor::{CancellationToken, Launcher};
pub use config::{LockPolicy, OrchestratorConfig};
pub use device::DeviceId;
pub use locks::{AcquireError, DeviceLease, DeviceLockRegistry};
pub use operation::{ImageProfile, NetworkConfig, OperationClass, OperationKind, OperationRequest};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use result::OperationResult;
pub use state::{OperationPhase, PhaseLog};
pub use validate::ValidationError;

/// Error types for orchestration setup and helper APIs
///
/// Operation outcomes are reported through [`OperationResult`], not this type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Command executor errors
    #[error("Command execution error: {0}")]
    CommandExecutor(#[from] command_executor::Error),

    /// Request failed validation
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parse error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
