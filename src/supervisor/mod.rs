//! Process-wide control loop and its startup helpers.

pub mod loop_;

pub use loop_::Supervisor;

use crate::config::SupervisorConfig;
use crate::git_ops;
use crate::types::RevisionPointer;
use anyhow::{Context, Result};

/// Revision the working copy has checked out, used as the running revision
/// of a fresh incarnation.
pub async fn running_revision(config: &SupervisorConfig) -> Result<RevisionPointer> {
    let repo = config.resolved_repo_path();
    let head = git_ops::head_revision(&repo, config.git_timeout())
        .await
        .with_context(|| format!("Failed to read HEAD of working copy {}", repo.display()))?;
    Ok(RevisionPointer::new(head))
}
