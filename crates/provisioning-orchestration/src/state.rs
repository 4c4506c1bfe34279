//! Per-operation lifecycle

use serde::Serialize;
use std::fmt;

/// A step in an operation's lifecycle
///
/// ```text
/// Received → Validated → Locked → Executing → Succeeded | Failed | TimedOut → Released
///     └──────────┴→ Rejected ─────────────────────────────────────────────────↗
/// ```
///
/// `Rejected` covers failed validation and failed lock acquisition; no lock is
/// held and nothing was executed. Caller cancellation during execution ends in
/// `TimedOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum OperationPhase {
    Received,
    Validated,
    Rejected,
    Locked,
    Executing,
    Succeeded,
    Failed,
    TimedOut,
    Released,
}

impl OperationPhase {
    /// Whether the operation has finished (only `Released` may follow)
    pub fn is_outcome(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Succeeded | Self::Failed | Self::TimedOut
        )
    }

    fn can_advance_to(self, next: Self) -> bool {
        use OperationPhase::*;
        matches!(
            (self, next),
            (Received, Validated | Rejected)
                | (Validated, Locked | Rejected)
                | (Locked, Executing)
                | (Executing, Succeeded | Failed | TimedOut)
                | (Rejected | Succeeded | Failed | TimedOut, Released)
        )
    }
}

impl fmt::Display for OperationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The phases one operation has passed through, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PhaseLog(Vec<OperationPhase>);

impl PhaseLog {
    pub(crate) fn new() -> Self {
        Self(vec![OperationPhase::Received])
    }

    /// Most recent phase
    pub fn current(&self) -> OperationPhase {
        // Never empty: starts at Received and only grows.
        self.0
            .last()
            .copied()
            .unwrap_or(OperationPhase::Received)
    }

    /// Every phase, oldest first
    pub fn phases(&self) -> &[OperationPhase] {
        &self.0
    }

    /// Whether the log reached `phase`
    pub fn contains(&self, phase: OperationPhase) -> bool {
        self.0.contains(&phase)
    }

    /// Record a transition
    ///
    /// # Panics
    ///
    /// On a transition the lifecycle does not allow, such as releasing twice.
    pub(crate) fn advance(&mut self, next: OperationPhase) {
        let current = self.current();
        assert!(
            current.can_advance_to(next),
            "illegal operation phase transition {current} -> {next}"
        );
        self.0.push(next);
    }
}
