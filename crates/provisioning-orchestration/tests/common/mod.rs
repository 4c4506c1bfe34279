//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use command_executor::{
    CancellationToken, Command, ExitStatus, Launcher, Result, RunLimits, RunOutcome, RunOutput,
};
use provisioning_orchestration::{
    DeviceId, ImageProfile, NetworkConfig, OperationRequest, Orchestrator, OrchestratorConfig,
};
use smol::Timer;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One recorded launcher invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub argv: Vec<String>,
    pub started: Instant,
    pub finished: Instant,
}

impl Call {
    pub fn overlaps(&self, other: &Call) -> bool {
        self.started < other.finished && other.started < self.finished
    }
}

/// Scripted behaviour for one program
#[derive(Debug, Clone)]
pub struct Reply {
    pub delay: Duration,
    pub exit_code: i32,
    pub stderr: String,
    /// Bytes written to the `-o` path of a capture command
    pub capture_bytes: Option<usize>,
}

impl Default for Reply {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            exit_code: 0,
            stderr: String::new(),
            capture_bytes: Some(4096),
        }
    }
}

impl Reply {
    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_string();
        self
    }

    pub fn capture_bytes(mut self, bytes: Option<usize>) -> Self {
        self.capture_bytes = bytes;
        self
    }
}

/// Launcher that records invocations instead of spawning processes
///
/// Honours the time limit and the cancellation token like a real launcher.
#[derive(Debug, Default)]
pub struct SpyLauncher {
    calls: Mutex<Vec<Call>>,
    replies: Mutex<HashMap<String, Reply>>,
    fallback: Mutex<Reply>,
}

impl SpyLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the reply for `program`
    pub fn reply(&self, program: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(program.to_string(), reply);
    }

    /// Reply used for every program without a scripted one
    pub fn reply_all(&self, reply: Reply) {
        *self.fallback.lock().unwrap() = reply;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn reply_for(&self, program: &str) -> Reply {
        self.replies
            .lock()
            .unwrap()
            .get(program)
            .cloned()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }
}

#[async_trait]
impl Launcher for SpyLauncher {
    async fn run(
        &self,
        command: Command,
        limits: RunLimits,
        cancel: &CancellationToken,
    ) -> Result<RunOutput> {
        let argv = command.argv();
        let reply = self.reply_for(&argv[0]);
        let started = Instant::now();

        let outcome = smol::future::or(
            async {
                Timer::after(reply.delay).await;
                RunOutcome::Exited(ExitStatus {
                    code: Some(reply.exit_code),
                    signal: None,
                })
            },
            smol::future::or(
                async {
                    cancel.cancelled().await;
                    RunOutcome::Cancelled
                },
                async {
                    Timer::after(limits.timeout).await;
                    RunOutcome::TimedOut
                },
            ),
        )
        .await;

        if outcome.success() && argv.iter().any(|a| a == "-c") {
            if let (Some(bytes), Some(pos)) =
                (reply.capture_bytes, argv.iter().position(|a| a == "-o"))
            {
                std::fs::write(&argv[pos + 1], vec![0xAB; bytes]).unwrap();
            }
        }

        let finished = Instant::now();
        self.calls.lock().unwrap().push(Call {
            argv,
            started,
            finished,
        });

        Ok(RunOutput::new(outcome, finished - started).with_stderr(reply.stderr))
    }
}

pub fn orchestrator(
    config: OrchestratorConfig,
    spy: &Arc<SpyLauncher>,
) -> Arc<Orchestrator<Arc<SpyLauncher>>> {
    Arc::new(Orchestrator::new(config, spy.clone()).unwrap())
}

/// Wait until `id` shows up in the lock registry
pub async fn wait_until_held(orchestrator: &Orchestrator<Arc<SpyLauncher>>, id: &str) {
    let id = DeviceId::new(id);
    let deadline = Instant::now() + Duration::from_secs(5);
    while !orchestrator.lock_registry().is_held(&id) {
        assert!(Instant::now() < deadline, "{id} was never locked");
        Timer::after(Duration::from_millis(5)).await;
    }
}

pub fn profile(fs: &str) -> ImageProfile {
    ImageProfile {
        image_name: "web01".to_string(),
        image_size: 8 * 1024 * 1024,
        file_system: fs.to_string(),
        compression_type: "gzip".to_string(),
        description: "web server golden image".to_string(),
    }
}

pub fn network_config() -> NetworkConfig {
    NetworkConfig {
        ip_address: "192.168.1.100".to_string(),
        subnet_mask: "255.255.255.0".to_string(),
        gateway: "192.168.1.1".to_string(),
        server_address: "192.168.1.10".to_string(),
    }
}

pub fn create_partition(device: &str) -> OperationRequest {
    OperationRequest::CreatePartition {
        device: device.to_string(),
        partition_type: "primary".to_string(),
        size_mb: 1024,
    }
}

pub fn format_partition(partition: &str) -> OperationRequest {
    OperationRequest::FormatPartition {
        partition: partition.to_string(),
        filesystem: "ext4".to_string(),
    }
}
