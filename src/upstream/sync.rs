//! Apply a fetched revision to the working copy, rolling back on failure.
//!
//! Order of operations:
//!   1. record `HEAD` and refuse to continue if the tree has local drift
//!   2. fetch the branch into the object store (working tree untouched)
//!   3. confirm the target commit arrived
//!   4. `reset --hard` to the target and verify the result
//!
//! Any failure in step 4 resets back to the recorded `HEAD` before returning.
//! All of it, rollback included, fits inside the configured git timeout.

use crate::config::SupervisorConfig;
use crate::error::{GitError, SyncError};
use crate::git_ops;
use crate::types::{RevisionPointer, SyncOutcome};
use crate::upstream::Synchronizer;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Git-backed synchronizer for a single working copy.
#[derive(Debug, Clone)]
pub struct GitSynchronizer {
    repo_path: PathBuf,
    url: String,
    branch: String,
    timeout: Duration,
}

/// Time allowed for one `apply` call, rollback included.
///
/// Forward steps stop at `deadline - reserve`; the reserve is kept for
/// rolling back, so the whole call ends by `deadline`.
struct Budget {
    deadline: Instant,
    reserve: Duration,
}

impl Budget {
    fn new(total: Duration) -> Self {
        Self {
            deadline: Instant::now() + total,
            reserve: total / ROLLBACK_SHARE,
        }
    }

    /// Time left for forward steps, `None` once only the reserve remains.
    fn remaining(&self) -> Option<Duration> {
        let left = self
            .deadline
            .saturating_duration_since(Instant::now())
            .saturating_sub(self.reserve);
        (!left.is_zero()).then_some(left)
    }

    /// Time left for rollback: the reserve plus anything forward steps left over.
    fn rollback_remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Fraction of the budget (1/n) held back for rollback.
const ROLLBACK_SHARE: u32 = 3;

impl GitSynchronizer {
    pub fn new(
        repo_path: impl Into<PathBuf>,
        url: impl Into<String>,
        branch: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            repo_path: repo_path.into(),
            url: url.into(),
            branch: branch.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(
            config.resolved_repo_path(),
            &config.repo_url,
            &config.branch,
            config.git_timeout(),
        )
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    async fn try_apply(&self, target: &RevisionPointer) -> Result<RevisionPointer, SyncError> {
        let budget = Budget::new(self.timeout);
        let repo = self.repo_path.as_path();

        let previous = git_ops::head_revision(repo, self.step(&budget, target)?)
            .await
            .map_err(|e| apply_err(target, format!("cannot read HEAD: {e}")))?;

        if previous == target.as_str() {
            debug!(revision = %target.short(), "Working copy already at target");
            return Ok(target.clone());
        }

        let dirty = git_ops::dirty_paths(repo, self.step(&budget, target)?)
            .await
            .map_err(|e| apply_err(target, format!("cannot inspect working copy: {e}")))?;
        if !dirty.is_empty() {
            return Err(SyncError::DirtyWorkingCopy { paths: dirty });
        }

        git_ops::fetch_branch(repo, &self.url, &self.branch, self.fetch_step(&budget, target)?)
            .await
            .map_err(|e| fetch_err(target, e.to_string()))?;

        let present = git_ops::has_commit(repo, target.as_str(), self.fetch_step(&budget, target)?)
            .await
            .map_err(|e| fetch_err(target, e.to_string()))?;
        if !present {
            return Err(fetch_err(
                target,
                format!("{} is no longer reachable from {}", target.short(), self.branch),
            ));
        }

        match self.checkout_and_verify(target, &budget).await {
            Ok(()) => Ok(target.clone()),
            Err(reason) => {
                let reason = match self.rollback(&previous, &budget).await {
                    Ok(()) => reason,
                    Err(rb) => {
                        error!(
                            revision = %previous,
                            path = %self.repo_path.display(),
                            "Rollback failed, working copy may be inconsistent: {rb}"
                        );
                        format!("{reason}; rollback to {previous} also failed: {rb}")
                    }
                };
                Err(apply_err(target, reason))
            }
        }
    }

    async fn checkout_and_verify(
        &self,
        target: &RevisionPointer,
        budget: &Budget,
    ) -> Result<(), String> {
        let repo = self.repo_path.as_path();
        git_ops::reset_hard(repo, target.as_str(), self.local_step(budget)?)
            .await
            .map_err(|e| e.to_string())?;

        let head = git_ops::head_revision(repo, self.local_step(budget)?)
            .await
            .map_err(|e| format!("cannot read HEAD after checkout: {e}"))?;
        if head != target.as_str() {
            return Err(format!("HEAD is {head} after checkout"));
        }

        let dirty = git_ops::dirty_paths(repo, self.local_step(budget)?)
            .await
            .map_err(|e| format!("cannot inspect working copy after checkout: {e}"))?;
        if !dirty.is_empty() {
            return Err(format!("checkout left changes in {}", dirty.join(", ")));
        }
        Ok(())
    }

    /// Restore the recorded revision within the budget's reserve.
    async fn rollback(&self, previous: &str, budget: &Budget) -> Result<(), GitError> {
        warn!(revision = %previous, "Rolling working copy back");
        let repo = self.repo_path.as_path();
        git_ops::reset_hard(repo, previous, budget.rollback_remaining()).await?;
        git_ops::clean_untracked(repo, budget.rollback_remaining()).await?;
        Ok(())
    }

    fn local_step(&self, budget: &Budget) -> Result<Duration, String> {
        budget
            .remaining()
            .ok_or_else(|| format!("exceeded {:?} budget", self.timeout))
    }

    /// Budget for a local step; running out is reported as an apply failure.
    fn step(&self, budget: &Budget, target: &RevisionPointer) -> Result<Duration, SyncError> {
        budget
            .remaining()
            .ok_or_else(|| apply_err(target, format!("exceeded {:?} budget", self.timeout)))
    }

    fn fetch_step(&self, budget: &Budget, target: &RevisionPointer) -> Result<Duration, SyncError> {
        budget
            .remaining()
            .ok_or_else(|| fetch_err(target, format!("exceeded {:?} budget", self.timeout)))
    }
}

#[async_trait]
impl Synchronizer for GitSynchronizer {
    async fn apply(&self, target: &RevisionPointer) -> SyncOutcome {
        info!(revision = %target.short(), path = %self.repo_path.display(), "Applying revision");
        match self.try_apply(target).await {
            Ok(rev) => SyncOutcome::Applied(rev),
            Err(e) => {
                if let SyncError::Apply { .. } = &e {
                    error!(revision = %target.short(), "Apply failed: {e}");
                }
                SyncOutcome::Failed(e)
            }
        }
    }
}

fn fetch_err(target: &RevisionPointer, reason: impl Into<String>) -> SyncError {
    SyncError::Fetch {
        target: target.clone(),
        reason: reason.into(),
    }
}

fn apply_err(target: &RevisionPointer, reason: impl Into<String>) -> SyncError {
    SyncError::Apply {
        target: target.clone(),
        reason: reason.into(),
    }
}
