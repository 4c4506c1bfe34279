//! The orchestration pipeline
//!
//! `execute` drives one request through validate, lock, execute, classify and
//! release. The device lease lives only inside `Orchestrator::drive`, so it
//! is dropped (and the locks released) on every exit path, including panics
//! and a dropped future.

use crate::boot;
use crate::classify::{ErrorKind, ToolFailure, classify};
use crate::config::OrchestratorConfig;
use crate::locks::{AcquireError, DeviceLockRegistry};
use crate::operation::OperationRequest;
use crate::result::{OperationResult, excerpt};
use crate::state::{OperationPhase, PhaseLog};
use crate::Result;
use command_executor::{CancellationToken, Command, Launcher, RunLimits, RunOutcome};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Runs provisioning operations against devices
///
/// Cheap to share behind an `Arc`; every method takes `&self` and any number
/// of operations may be in flight at once.
pub struct Orchestrator<L: Launcher> {
    config: Arc<OrchestratorConfig>,
    launcher: L,
    locks: DeviceLockRegistry,
    span: Span,
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder<L: Launcher> {
    config: OrchestratorConfig,
    launcher: L,
    span: Option<Span>,
}

impl<L: Launcher> OrchestratorBuilder<L> {
    /// Parent span for every operation span
    ///
    /// Lets the embedding service route this orchestrator's events without
    /// any process-global logger state.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Validate the configuration and build the orchestrator
    pub fn build(self) -> Result<Orchestrator<L>> {
        self.config.validate()?;
        let span = self
            .span
            .unwrap_or_else(|| info_span!("orchestrator"));
        let locks = DeviceLockRegistry::new(self.config.lock_policy);

        span.in_scope(|| {
            info!(
                lock_policy = ?self.config.lock_policy,
                capture_timeout_secs = self.config.capture_timeout.as_secs(),
                restore_timeout_secs = self.config.restore_timeout.as_secs(),
                partition_op_timeout_secs = self.config.partition_op_timeout.as_secs(),
                "orchestrator ready"
            )
        });

        Ok(Orchestrator {
            config: Arc::new(self.config),
            launcher: self.launcher,
            locks,
            span,
        })
    }
}

/// What the pipeline produced, before it is frozen into a result
#[derive(Debug, Default)]
struct Outcome {
    error_kind: Option<ErrorKind>,
    exit_code: Option<i32>,
    stderr: String,
    detail: Option<String>,
}

impl Outcome {
    fn success(exit_code: Option<i32>, stderr: String) -> Self {
        Self {
            exit_code,
            stderr,
            ..Self::default()
        }
    }

    fn failed(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            error_kind: Some(kind),
            detail: Some(detail.into()),
            ..Self::default()
        }
    }

    fn phase(&self) -> OperationPhase {
        match self.error_kind {
            None => OperationPhase::Succeeded,
            Some(ErrorKind::Timeout | ErrorKind::Cancelled) => OperationPhase::TimedOut,
            Some(_) => OperationPhase::Failed,
        }
    }
}

impl<L: Launcher> Orchestrator<L> {
    /// Build an orchestrator with the default span
    pub fn new(config: OrchestratorConfig, launcher: L) -> Result<Self> {
        Self::builder(config, launcher).build()
    }

    /// Start building an orchestrator
    pub fn builder(config: OrchestratorConfig, launcher: L) -> OrchestratorBuilder<L> {
        OrchestratorBuilder {
            config,
            launcher,
            span: None,
        }
    }

    /// The immutable configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Read access to the lock registry, for inspection
    pub fn lock_registry(&self) -> &DeviceLockRegistry {
        &self.locks
    }

    /// Run `request` to completion
    pub async fn execute(&self, request: OperationRequest) -> OperationResult {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Run `request` to completion, aborting when `cancel` fires
    ///
    /// Cancellation while waiting for a lock or while the external tool runs
    /// yields [`ErrorKind::Cancelled`]; the process tree is killed and the
    /// locks are released before this returns.
    pub async fn execute_with_cancel(
        &self,
        request: OperationRequest,
        cancel: &CancellationToken,
    ) -> OperationResult {
        let operation_id = Uuid::new_v4();
        let kind = request.kind();
        let span = info_span!(
            parent: &self.span,
            "operation",
            %operation_id,
            operation = %kind
        );

        async move {
            let started = Instant::now();
            let mut phases = PhaseLog::new();
            debug!(?request, "operation received");

            let outcome = self.drive(&request, cancel, &mut phases).await;
            phases.advance(OperationPhase::Released);

            let result = OperationResult {
                operation_id,
                operation: kind,
                succeeded: outcome.error_kind.is_none(),
                duration_ms: started.elapsed().as_millis() as u64,
                exit_code: outcome.exit_code,
                stderr_excerpt: excerpt(&outcome.stderr, self.config.stderr_excerpt_bytes),
                error_kind: outcome.error_kind,
                detail: outcome.detail,
                phases,
            };

            match result.error_kind {
                None => info!(duration_ms = result.duration_ms, "operation succeeded"),
                Some(kind) => warn!(
                    error_kind = %kind,
                    exit_code = ?result.exit_code,
                    detail = result.detail.as_deref().unwrap_or(""),
                    duration_ms = result.duration_ms,
                    "operation failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Validate, lock and perform; the lease is released on return
    async fn drive(
        &self,
        request: &OperationRequest,
        cancel: &CancellationToken,
        phases: &mut PhaseLog,
    ) -> Outcome {
        if let Err(e) = request.validate(&self.config) {
            phases.advance(OperationPhase::Rejected);
            return Outcome::failed(ErrorKind::InvalidRequest, e.to_string());
        }
        phases.advance(OperationPhase::Validated);

        let ids = request.device_ids(&self.config);
        let lease = match self.locks.acquire(ids, cancel).await {
            Ok(lease) => lease,
            Err(e @ AcquireError::Busy(_)) => {
                phases.advance(OperationPhase::Rejected);
                return Outcome::failed(ErrorKind::DeviceBusy, e.to_string());
            }
            Err(e @ AcquireError::Cancelled) => {
                phases.advance(OperationPhase::Rejected);
                return Outcome::failed(ErrorKind::Cancelled, e.to_string());
            }
        };
        phases.advance(OperationPhase::Locked);
        let devices: Vec<&str> = lease.ids().iter().map(|id| id.as_str()).collect();
        debug!(?devices, "devices locked");

        phases.advance(OperationPhase::Executing);
        let outcome = match request.command(&self.config) {
            Some(command) => self.run_tool(request, command, cancel).await,
            None => self.write_boot_config(request, cancel).await,
        };
        phases.advance(outcome.phase());

        drop(lease);
        outcome
    }

    async fn run_tool(
        &self,
        request: &OperationRequest,
        mut command: Command,
        cancel: &CancellationToken,
    ) -> Outcome {
        let kind = request.kind();

        if let Some(dir) = &self.config.tool_dir {
            let program = dir.join(command.get_program());
            command.set_program(program);
        }

        if let OperationRequest::MountPartition { mount_point, .. } = request {
            if let Err(e) = async_fs::create_dir_all(mount_point).await {
                return Outcome::failed(
                    ErrorKind::ExternalToolFailure(ToolFailure::from_io(e.kind())),
                    format!("failed to create mount point {mount_point}: {e}"),
                );
            }
        }

        // The post-condition must see this run's image, not an older one.
        if let OperationRequest::CaptureImage {
            destination_path, ..
        } = request
        {
            if let Err(e) = remove_stale_image(destination_path).await {
                return Outcome::failed(
                    ErrorKind::ExternalToolFailure(ToolFailure::from_io(e.kind())),
                    format!("failed to clear capture destination {destination_path}: {e}"),
                );
            }
        }

        let timeout = self.config.timeout_for(kind);
        let limits =
            RunLimits::with_timeout(timeout).capture_limit(self.config.capture_limit_bytes);
        info!(
            program = %command.get_program().to_string_lossy(),
            command = %command,
            timeout_secs = timeout.as_secs_f64(),
            "running external tool"
        );

        let output = match self.launcher.run(command, limits, cancel).await {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "external tool could not be run");
                let failure = if e.is_not_found() {
                    ToolFailure::ToolNotFound
                } else {
                    ToolFailure::Unclassified
                };
                return Outcome::failed(ErrorKind::ExternalToolFailure(failure), e.to_string());
            }
        };

        if output.stdout_truncated || output.stderr_truncated {
            debug!(
                stdout_truncated = output.stdout_truncated,
                stderr_truncated = output.stderr_truncated,
                "tool output exceeded capture limit"
            );
        }
        let stderr = output.stderr_lossy();

        let status = match output.outcome {
            RunOutcome::TimedOut => {
                return Outcome {
                    stderr,
                    ..Outcome::failed(
                        ErrorKind::Timeout,
                        format!("exceeded time limit of {}s", timeout.as_secs_f64()),
                    )
                };
            }
            RunOutcome::Cancelled => {
                return Outcome {
                    stderr,
                    ..Outcome::failed(ErrorKind::Cancelled, "cancelled by caller")
                };
            }
            RunOutcome::Exited(status) => status,
        };

        if !status.success() {
            let detail = match (status.code, status.signal) {
                (Some(code), _) => format!("{kind} exited with code {code}"),
                (None, Some(signal)) => format!("{kind} terminated by signal {signal}"),
                (None, None) => format!("{kind} exited abnormally"),
            };
            return Outcome {
                exit_code: status.code,
                stderr: stderr.clone(),
                ..Outcome::failed(classify(status.code, &stderr), detail)
            };
        }

        if let OperationRequest::CaptureImage {
            destination_path, ..
        } = request
        {
            if let Err(detail) = check_capture_artifact(destination_path).await {
                return Outcome {
                    exit_code: status.code,
                    stderr,
                    ..Outcome::failed(ErrorKind::PostConditionFailed, detail)
                };
            }
        }

        Outcome::success(status.code, stderr)
    }

    async fn write_boot_config(
        &self,
        request: &OperationRequest,
        cancel: &CancellationToken,
    ) -> Outcome {
        if cancel.is_cancelled() {
            return Outcome::failed(ErrorKind::Cancelled, "cancelled by caller");
        }

        let dir = &self.config.boot_config_dir;
        let written = match request {
            OperationRequest::ConfigureNetworkBoot { network_config } => {
                boot::write_network_boot(dir, network_config).await
            }
            OperationRequest::ConfigureMulticast { network_config } => {
                boot::write_multicast(
                    dir,
                    network_config,
                    &self.config.dhcp_interface,
                    &self.config.tftp_root,
                )
                .await
            }
            other => {
                return Outcome::failed(
                    ErrorKind::InvalidRequest,
                    format!("{} has no external command", other.kind()),
                );
            }
        };

        match written {
            Ok(paths) => {
                for path in &paths {
                    info!(path = %path.display(), "boot artifact written");
                }
                Outcome::success(None, String::new())
            }
            Err(e) => Outcome::failed(
                ErrorKind::ExternalToolFailure(ToolFailure::from_io(e.kind())),
                format!("failed to write boot configuration in {}: {e}", dir.display()),
            ),
        }
    }
}

/// Remove an image left at `path` by an earlier capture
async fn remove_stale_image(path: &str) -> std::io::Result<()> {
    match async_fs::remove_file(path).await {
        Ok(()) => {
            info!(path, "removed previous image at capture destination");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// A capture only counts if the image file exists and is non-empty
async fn check_capture_artifact(path: &str) -> std::result::Result<(), String> {
    match async_fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(meta) if meta.is_file() => Err(format!("capture produced an empty image at {path}")),
        Ok(_) => Err(format!("capture destination {path} is not a regular file")),
        Err(e) => Err(format!("capture destination {path} is missing: {e}")),
    }
}

impl<L: Launcher> std::fmt::Debug for Orchestrator<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}
