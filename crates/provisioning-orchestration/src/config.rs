//! Orchestrator configuration.
//!
//! The configuration is supplied once, at construction, and is immutable
//! afterwards. It can be built in code or loaded from YAML:
//!
//! ```yaml
//! lock_policy: queue
//! capture_timeout_secs: 14400
//! restore_timeout_secs: 14400
//! partition_op_timeout_secs: 300
//! supported_filesystems: [ext4, xfs, vfat]
//! boot_config_dir: /srv/tftp
//! ```

use crate::operation::OperationKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_FILESYSTEMS: &[&str] = &[
    "ext2", "ext3", "ext4", "xfs", "btrfs", "vfat", "fat32", "ntfs", "exfat",
];

/// What to do when a required device identifier is already locked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Reject the request with `DeviceBusy` immediately
    #[default]
    FailFast,
    /// Wait until every identifier is free, then take them all at once
    Queue,
}

/// Configuration for an [`Orchestrator`](crate::Orchestrator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Lock contention policy
    pub lock_policy: LockPolicy,
    /// Time limit for image capture
    #[serde(rename = "capture_timeout_secs", with = "duration_secs")]
    pub capture_timeout: Duration,
    /// Time limit for image restore
    #[serde(rename = "restore_timeout_secs", with = "duration_secs")]
    pub restore_timeout: Duration,
    /// Time limit for partition, filesystem, mount and LVM operations
    #[serde(rename = "partition_op_timeout_secs", with = "duration_secs")]
    pub partition_op_timeout: Duration,
    /// Filesystem identifiers accepted by format and image operations
    pub supported_filesystems: BTreeSet<String>,
    /// Directory that boot artifacts are written to
    pub boot_config_dir: PathBuf,
    /// Directory external tools are resolved from; `PATH` lookup when unset
    pub tool_dir: Option<PathBuf>,
    /// Maximum stderr bytes kept in a result
    pub stderr_excerpt_bytes: usize,
    /// Maximum bytes captured per output stream of an external tool
    pub capture_limit_bytes: usize,
    /// TFTP root announced in the generated dnsmasq configuration
    pub tftp_root: PathBuf,
    /// Interface dnsmasq binds to in the generated configuration
    pub dhcp_interface: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lock_policy: LockPolicy::FailFast,
            capture_timeout: Duration::from_secs(4 * 60 * 60),
            restore_timeout: Duration::from_secs(4 * 60 * 60),
            partition_op_timeout: Duration::from_secs(5 * 60),
            supported_filesystems: DEFAULT_FILESYSTEMS.iter().map(|s| s.to_string()).collect(),
            boot_config_dir: PathBuf::from("/var/lib/tftpboot"),
            tool_dir: None,
            stderr_excerpt_bytes: 4096,
            capture_limit_bytes: command_executor::DEFAULT_CAPTURE_LIMIT,
            tftp_root: PathBuf::from("/var/lib/tftpboot"),
            dhcp_interface: "eth0".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("capture_timeout_secs", self.capture_timeout),
            ("restore_timeout_secs", self.restore_timeout),
            ("partition_op_timeout_secs", self.partition_op_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }

        if self.supported_filesystems.is_empty() {
            return Err(Error::Config(
                "supported_filesystems must not be empty".to_string(),
            ));
        }
        if let Some(bad) = self
            .supported_filesystems
            .iter()
            .find(|fs| fs.is_empty() || !fs.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(Error::Config(format!(
                "invalid filesystem identifier in supported_filesystems: {bad:?}"
            )));
        }

        if !self.boot_config_dir.is_absolute() {
            return Err(Error::Config(format!(
                "boot_config_dir must be absolute, got {}",
                self.boot_config_dir.display()
            )));
        }
        if let Some(dir) = &self.tool_dir {
            if !dir.is_absolute() {
                return Err(Error::Config(format!(
                    "tool_dir must be absolute, got {}",
                    dir.display()
                )));
            }
        }
        if self.capture_limit_bytes == 0 {
            return Err(Error::Config(
                "capture_limit_bytes must be greater than zero".to_string(),
            ));
        }
        if self.dhcp_interface.trim().is_empty() {
            return Err(Error::Config("dhcp_interface must not be empty".to_string()));
        }

        Ok(())
    }

    /// Whether `fs` is on the whitelist (case-insensitive)
    pub fn supports_filesystem(&self, fs: &str) -> bool {
        self.supported_filesystems
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(fs))
    }

    /// Time limit that applies to an operation kind
    ///
    /// Image transfer is size-proportional, so capture and restore get their
    /// own (much longer) limits.
    pub fn timeout_for(&self, kind: OperationKind) -> Duration {
        match kind {
            OperationKind::CaptureImage => self.capture_timeout,
            OperationKind::RestoreImage => self.restore_timeout,
            _ => self.partition_op_timeout,
        }
    }

    /// Set the lock policy
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    /// Set the capture time limit
    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    /// Set the restore time limit
    pub fn with_restore_timeout(mut self, timeout: Duration) -> Self {
        self.restore_timeout = timeout;
        self
    }

    /// Set the time limit for storage operations
    pub fn with_partition_op_timeout(mut self, timeout: Duration) -> Self {
        self.partition_op_timeout = timeout;
        self
    }

    /// Set the boot artifact directory
    pub fn with_boot_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.boot_config_dir = dir.into();
        self
    }

    /// Resolve external tools from `dir` instead of `PATH`
    pub fn with_tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tool_dir = Some(dir.into());
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
