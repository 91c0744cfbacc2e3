//! Shared types used across the supervisor.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Revisions
// ---------------------------------------------------------------------------

/// Opaque identifier naming one state of the tracked repository.
///
/// In practice this is a full commit hash, but nothing outside `git_ops`
/// relies on that. Pointers compare for equality only; there is no ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionPointer(String);

impl RevisionPointer {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for RevisionPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of asking the tracker whether the remote moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheckResult {
    NoChange,
    ChangeAvailable(RevisionPointer),
}

/// Result of one synchronization attempt.
///
/// On `Failed` the working copy is in the same state it was before the call.
#[derive(Debug)]
pub enum SyncOutcome {
    Applied(RevisionPointer),
    Failed(SyncError),
}

// ---------------------------------------------------------------------------
// Supervisor state machine
// ---------------------------------------------------------------------------

/// States the supervisor loop moves through within one incarnation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    /// Waiting for the next tick.
    Idle,
    /// Asking the tracker for the remote tip.
    Checking,
    /// Applying a new revision to the working copy.
    Syncing,
    /// Terminal for this incarnation.
    Restarting,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Checking => write!(f, "checking"),
            Self::Syncing => write!(f, "syncing"),
            Self::Restarting => write!(f, "restarting"),
        }
    }
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::Idle
    }
}

/// How a single check-then-maybe-sync cycle resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Remote tip equals the running revision.
    Unchanged,
    /// Tracker failed; logged, loop continues.
    CheckFailed,
    /// Synchronizer failed for `target`; retried on the next tick.
    SyncFailed { target: RevisionPointer },
    /// Working copy now reflects the revision; the loop must restart.
    Applied(RevisionPointer),
}

impl CycleOutcome {
    /// State the loop lands in after this outcome.
    pub fn next_state(&self) -> SupervisorState {
        match self {
            Self::Applied(_) => SupervisorState::Restarting,
            _ => SupervisorState::Idle,
        }
    }
}

/// Why the loop returned control to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// Stop signal honoured while idle.
    Stopped,
    /// A new revision was applied; the caller must restart the process.
    Restart {
        previous: RevisionPointer,
        applied: RevisionPointer,
    },
}

// ---------------------------------------------------------------------------
// Process exit codes
// ---------------------------------------------------------------------------

/// Exit codes seen by the process manager.
pub mod exit_codes {
    /// Stopped on request.
    pub const EXIT_SUCCESS: i32 = 0;
    /// Unexpected failure, including a failed restart.
    pub const EXIT_FAILURE: i32 = 1;
    /// New code was applied; relaunch the process.
    pub const EXIT_RESTART: i32 = 3;
    /// Misconfiguration detected at startup (sysexits `EX_CONFIG`).
    pub const EXIT_CONFIG: i32 = 78;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_revision_truncates_long_hashes() {
        let rev = RevisionPointer::new("0123456789abcdef0123456789abcdef01234567");
        assert_eq!(rev.short(), "0123456789ab");
    }

    #[test]
    fn short_revision_keeps_short_ids() {
        let rev = RevisionPointer::new("abc");
        assert_eq!(rev.short(), "abc");
    }

    #[test]
    fn only_applied_leads_to_restart() {
        let rev = RevisionPointer::new("b");
        assert_eq!(CycleOutcome::Applied(rev.clone()).next_state(), SupervisorState::Restarting);
        assert_eq!(CycleOutcome::Unchanged.next_state(), SupervisorState::Idle);
        assert_eq!(CycleOutcome::CheckFailed.next_state(), SupervisorState::Idle);
        assert_eq!(
            CycleOutcome::SyncFailed { target: rev }.next_state(),
            SupervisorState::Idle
        );
    }

    #[test]
    fn exit_codes_are_distinct() {
        use exit_codes::*;
        let codes = [EXIT_SUCCESS, EXIT_FAILURE, EXIT_RESTART, EXIT_CONFIG];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
