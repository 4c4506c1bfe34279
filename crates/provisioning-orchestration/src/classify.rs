//! Error taxonomy and external-tool failure classification

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::io;
use std::sync::LazyLock;

/// Why an operation did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum ErrorKind {
    /// Local validation failed; nothing was locked or spawned
    InvalidRequest,
    /// A required device was locked by another operation
    DeviceBusy,
    /// The external tool exceeded its time limit and was killed
    Timeout,
    /// The caller cancelled the operation
    Cancelled,
    /// The external tool failed
    ExternalToolFailure(ToolFailure),
    /// The tool reported success but its output is missing or empty
    PostConditionFailed,
}

impl ErrorKind {
    /// Whether resubmitting the same request later may succeed
    ///
    /// The orchestrator itself never retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::DeviceBusy
                | Self::Timeout
                | Self::Cancelled
                | Self::ExternalToolFailure(ToolFailure::FilesystemBusy)
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest => f.write_str("invalid request"),
            Self::DeviceBusy => f.write_str("device busy"),
            Self::Timeout => f.write_str("timed out"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::ExternalToolFailure(reason) => write!(f, "external tool failure ({reason})"),
            Self::PostConditionFailed => f.write_str("post-condition failed"),
        }
    }
}

/// Specific reason an external tool failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ToolFailure {
    DeviceNotFound,
    AlreadyExists,
    FilesystemBusy,
    PermissionDenied,
    NoSpace,
    ToolNotFound,
    Unclassified,
}

impl ToolFailure {
    /// Map a local I/O failure
    pub fn from_io(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => Self::DeviceNotFound,
            io::ErrorKind::AlreadyExists => Self::AlreadyExists,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::StorageFull => Self::NoSpace,
            io::ErrorKind::ResourceBusy => Self::FilesystemBusy,
            _ => Self::Unclassified,
        }
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DeviceNotFound => "device not found",
            Self::AlreadyExists => "already exists",
            Self::FilesystemBusy => "filesystem busy",
            Self::PermissionDenied => "permission denied",
            Self::NoSpace => "no space",
            Self::ToolNotFound => "tool not found",
            Self::Unclassified => "unclassified",
        };
        f.write_str(s)
    }
}

/// Shell convention: command found but not executable
const EXIT_NOT_EXECUTABLE: i32 = 126;
/// Shell convention: command not found
const EXIT_NOT_FOUND: i32 = 127;

// First match wins, so more specific phrases come first ("is mounted" must
// not shadow "already mounted").
static PATTERNS: LazyLock<Vec<(Regex, ToolFailure)>> = LazyLock::new(|| {
    [
        (
            r"already exists|already mounted|existing (file ?system|partition table)|contains an? .*file ?system",
            ToolFailure::AlreadyExists,
        ),
        (
            r"device or resource busy|target is busy|is busy|\bin use\b|is mounted",
            ToolFailure::FilesystemBusy,
        ),
        (
            r"permission denied|operation not permitted|must be (run as )?(superuser|root)|only root",
            ToolFailure::PermissionDenied,
        ),
        (
            r"no space left|insufficient free (space|extents)|not enough (free )?space",
            ToolFailure::NoSpace,
        ),
        (
            r"no such (file or directory|device)|does not exist|not found|can't find|cannot find|failed to find|not a block device|can't open|could not stat",
            ToolFailure::DeviceNotFound,
        ),
    ]
    .into_iter()
    .map(|(pattern, failure)| {
        let regex = Regex::new(&format!("(?i){pattern}")).expect("valid classifier pattern");
        (regex, failure)
    })
    .collect()
});

/// Classify a failed external tool run
///
/// Total and deterministic: every input maps to exactly one kind.
///
/// ```
/// use provisioning_orchestration::{classify, ErrorKind, ToolFailure};
///
/// assert_eq!(
///     classify(Some(32), "umount: /mnt/data: target is busy."),
///     ErrorKind::ExternalToolFailure(ToolFailure::FilesystemBusy),
/// );
/// ```
pub fn classify(exit_code: Option<i32>, stderr: &str) -> ErrorKind {
    let failure = match exit_code {
        Some(EXIT_NOT_FOUND) => ToolFailure::ToolNotFound,
        Some(EXIT_NOT_EXECUTABLE) => ToolFailure::PermissionDenied,
        _ => PATTERNS
            .iter()
            .find(|(regex, _)| regex.is_match(stderr))
            .map(|(_, failure)| *failure)
            .unwrap_or(ToolFailure::Unclassified),
    };
    ErrorKind::ExternalToolFailure(failure)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(exit_code: i32, stderr: &str) -> ToolFailure {
        match classify(Some(exit_code), stderr) {
            ErrorKind::ExternalToolFailure(failure) => failure,
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_real_tool_messages() {
        let cases = [
            ("Error: Could not stat device /dev/sdz - No such file or directory.", ToolFailure::DeviceNotFound),
            ("mkfs.ext4: /dev/sdb1 contains a ext4 file system", ToolFailure::AlreadyExists),
            ("  Logical volume \"data\" already exists in volume group \"vg0\"", ToolFailure::AlreadyExists),
            ("mount: /mnt/data: /dev/sdb1 already mounted on /mnt/data.", ToolFailure::AlreadyExists),
            ("umount: /mnt/data: target is busy.", ToolFailure::FilesystemBusy),
            ("mkfs.xfs: cannot open /dev/sdb1: Device or resource busy", ToolFailure::FilesystemBusy),
            ("  Volume group \"vg9\" not found", ToolFailure::DeviceNotFound),
            ("  Insufficient free space: 512 extents needed, but only 10 available", ToolFailure::NoSpace),
            ("mount: only root can do that", ToolFailure::PermissionDenied),
            ("partclone: open /dev/sda1 error: Permission denied", ToolFailure::PermissionDenied),
            ("something unexpected happened", ToolFailure::Unclassified),
            ("", ToolFailure::Unclassified),
        ];

        for (stderr, expected) in cases {
            assert_eq!(tool(1, stderr), expected, "{stderr}");
        }
    }

    #[test]
    fn test_exit_code_conventions_take_precedence() {
        assert_eq!(tool(127, "device busy"), ToolFailure::ToolNotFound);
        assert_eq!(tool(126, ""), ToolFailure::PermissionDenied);
    }

    #[test]
    fn test_case_insensitive_and_deterministic() {
        let a = classify(Some(1), "DEVICE OR RESOURCE BUSY");
        let b = classify(Some(1), "DEVICE OR RESOURCE BUSY");
        assert_eq!(a, b);
        assert_eq!(a, ErrorKind::ExternalToolFailure(ToolFailure::FilesystemBusy));
    }

    #[test]
    fn test_signal_death_without_exit_code() {
        assert_eq!(
            classify(None, ""),
            ErrorKind::ExternalToolFailure(ToolFailure::Unclassified)
        );
    }

    #[test]
    fn test_non_utf8_lossy_input_is_total() {
        let stderr = String::from_utf8_lossy(&[0xff, 0xfe, b'x']);
        assert_eq!(tool(3, &stderr), ToolFailure::Unclassified);
    }

    #[test]
    fn test_io_mapping() {
        assert_eq!(ToolFailure::from_io(io::ErrorKind::PermissionDenied), ToolFailure::PermissionDenied);
        assert_eq!(ToolFailure::from_io(io::ErrorKind::NotFound), ToolFailure::DeviceNotFound);
        assert_eq!(ToolFailure::from_io(io::ErrorKind::Other), ToolFailure::Unclassified);
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ErrorKind::DeviceBusy.is_transient());
        assert!(!ErrorKind::InvalidRequest.is_transient());
        assert!(!ErrorKind::ExternalToolFailure(ToolFailure::AlreadyExists).is_transient());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(ErrorKind::ExternalToolFailure(ToolFailure::NoSpace)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "external_tool_failure", "reason": "no_space"}));
        let json = serde_json::to_value(ErrorKind::DeviceBusy).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "device_busy"}));
    }
}
