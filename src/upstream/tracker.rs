//! Remote tip lookup via `git ls-remote`.

use crate::config::SupervisorConfig;
use crate::error::TrackerError;
use crate::git_ops;
use crate::types::{RevisionPointer, UpdateCheckResult};
use crate::upstream::UpdateTracker;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Tracker that asks the remote directly; it never touches the working copy.
#[derive(Debug, Clone)]
pub struct GitTracker {
    url: String,
    branch: String,
    timeout: Duration,
}

impl GitTracker {
    pub fn new(url: impl Into<String>, branch: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(&config.repo_url, &config.branch, config.git_timeout())
    }

    /// Current tip of the tracked branch.
    pub async fn remote_tip(&self) -> Result<RevisionPointer, TrackerError> {
        match git_ops::ls_remote_branch(&self.url, &self.branch, self.timeout).await {
            Ok(Some(hash)) => Ok(RevisionPointer::new(hash)),
            Ok(None) => Err(TrackerError::Protocol(format!(
                "branch '{}' not found on {}",
                self.branch, self.url
            ))),
            Err(e) if git_ops::is_protocol_failure(&e) => Err(TrackerError::Protocol(e.to_string())),
            Err(e) => Err(TrackerError::Network(e.to_string())),
        }
    }
}

#[async_trait]
impl UpdateTracker for GitTracker {
    async fn check_for_update(
        &self,
        current: &RevisionPointer,
    ) -> Result<UpdateCheckResult, TrackerError> {
        let tip = self.remote_tip().await?;
        debug!(remote = %tip.short(), running = %current.short(), "Resolved remote tip");
        Ok(compare(current, tip))
    }
}

/// Equality is the only comparison revisions support.
pub fn compare(current: &RevisionPointer, remote: RevisionPointer) -> UpdateCheckResult {
    if &remote == current {
        UpdateCheckResult::NoChange
    } else {
        UpdateCheckResult::ChangeAvailable(remote)
    }
}
