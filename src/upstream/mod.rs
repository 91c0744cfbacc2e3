//! Upstream awareness: detect new revisions on the remote and apply them to
//! the local working copy.
//!
//! Both collaborators are request/response only. Scheduling belongs to the
//! supervisor loop, which holds them behind these traits.

pub mod sync;
pub mod tracker;

pub use sync::GitSynchronizer;
pub use tracker::GitTracker;

use crate::error::TrackerError;
use crate::types::{RevisionPointer, SyncOutcome, UpdateCheckResult};
use async_trait::async_trait;

/// Decides whether the tracked branch moved past the running revision.
///
/// Implementations must not mutate local state and must not retry
/// internally; the caller owns the retry policy.
#[async_trait]
pub trait UpdateTracker: Send + Sync {
    async fn check_for_update(
        &self,
        current: &RevisionPointer,
    ) -> Result<UpdateCheckResult, TrackerError>;
}

/// Brings the working copy to exactly `target`, or leaves it untouched.
///
/// Implementations bound their own run time: the loop never cancels an
/// in-flight apply, since dropping it midway could leave a half-written tree.
#[async_trait]
pub trait Synchronizer: Send + Sync {
    async fn apply(&self, target: &RevisionPointer) -> SyncOutcome;
}
