//! Error taxonomy for the supervisor.
//!
//! Only `ConfigError` and `RestartError` may terminate the process. Tracker and
//! sync errors are caught at the loop boundary, logged, and retried next tick.

use crate::types::RevisionPointer;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Fatal: prevents the supervisor loop from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting `{key}`")]
    Missing { key: &'static str },

    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Failure of a single `git` invocation.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git {args} timed out after {timeout:?}")]
    Timeout { args: String, timeout: Duration },

    #[error("git {args} exited with {code:?}: {stderr}")]
    Failed {
        args: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Recoverable: the remote could not be queried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// Remote unreachable or the query timed out.
    #[error("network error: {0}")]
    Network(String),

    /// Remote answered but the tracked reference could not be resolved.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Recoverable: the working copy was left exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("fetch of {target} failed: {reason}")]
    Fetch {
        target: RevisionPointer,
        reason: String,
    },

    #[error("apply of {target} failed: {reason}")]
    Apply {
        target: RevisionPointer,
        reason: String,
    },

    #[error("working copy has local modifications: {}", paths.join(", "))]
    DirtyWorkingCopy { paths: Vec<String> },
}

impl SyncError {
    /// Short phase label for structured log fields.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Apply { .. } => "apply",
            Self::DirtyWorkingCopy { .. } => "preflight",
        }
    }
}

/// Fatal: the process could not hand over to its next incarnation.
#[derive(Debug, Error)]
pub enum RestartError {
    #[error("cannot locate current executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("failed to re-exec {exe}: {source}")]
    Exec {
        exe: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
