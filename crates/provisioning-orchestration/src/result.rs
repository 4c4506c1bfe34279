//! Structured operation results

use crate::classify::ErrorKind;
use crate::operation::OperationKind;
use crate::state::PhaseLog;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of one [`execute`](crate::Orchestrator::execute) call
///
/// Immutable once returned. Failures are values here, never `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub(crate) operation_id: Uuid,
    pub(crate) operation: OperationKind,
    pub(crate) succeeded: bool,
    pub(crate) duration_ms: u64,
    pub(crate) exit_code: Option<i32>,
    pub(crate) stderr_excerpt: String,
    pub(crate) error_kind: Option<ErrorKind>,
    pub(crate) detail: Option<String>,
    pub(crate) phases: PhaseLog,
}

impl OperationResult {
    /// Identifier recorded on every log line for this operation
    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    /// Which operation ran
    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    /// Whether the operation completed successfully
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Wall-clock time from receipt to release
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Exit code of the external tool, if one ran and exited normally
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Tail of the tool's stderr
    pub fn stderr_excerpt(&self) -> &str {
        &self.stderr_excerpt
    }

    /// Failure classification; `None` on success
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    /// Human readable explanation of a failure
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Lifecycle trace
    pub fn phases(&self) -> &PhaseLog {
        &self.phases
    }
}

/// Keep the last `limit` bytes of `stderr`, cut at a character boundary
///
/// Tools print the fatal message last, so the tail is the useful part.
pub(crate) fn excerpt(stderr: &str, limit: usize) -> String {
    if stderr.len() <= limit {
        return stderr.to_string();
    }
    let mut start = stderr.len() - limit;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    stderr[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_keeps_tail() {
        assert_eq!(excerpt("short", 100), "short");
        assert_eq!(excerpt("0123456789", 4), "6789");
        assert_eq!(excerpt("", 0), "");
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        // 'é' is two bytes; cutting inside it moves forward.
        let text = "aébc";
        assert_eq!(excerpt(text, 3), "bc");
        assert_eq!(excerpt(text, 4), "ébc");
    }
}
