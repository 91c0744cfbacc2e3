//! Persistent record of the last applied update.
//!
//! Written just before a restart so the next incarnation (and `mycelium status`)
//! can tell what happened. The running revision itself always comes from the
//! working copy's `HEAD`, never from this file.

use crate::types::RevisionPointer;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const RECORD_FILE: &str = "last_update.json";

/// One applied update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    /// Revision the working copy was moved to.
    pub revision: RevisionPointer,
    /// Revision that was running before.
    pub previous: RevisionPointer,
    #[serde(rename = "appliedAt")]
    pub applied_at: DateTime<Utc>,
    /// Number of update-driven restarts so far.
    pub incarnation: u64,
}

impl UpdateRecord {
    /// Record following `last` (if any) for an update from `previous` to `revision`.
    pub fn next(
        last: Option<&UpdateRecord>,
        previous: RevisionPointer,
        revision: RevisionPointer,
    ) -> Self {
        Self {
            revision,
            previous,
            applied_at: Utc::now(),
            incarnation: last.map_or(1, |r| r.incarnation + 1),
        }
    }
}

/// File-backed store under the configured state directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    /// Last record, or `None` if no update was ever applied.
    pub fn load(&self) -> Result<Option<UpdateRecord>> {
        let path = self.record_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let record = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(record))
    }

    /// Replace the record atomically (temp file + rename).
    pub fn save(&self, record: &UpdateRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state dir {}", self.dir.display()))?;

        let path = self.record_path();
        let tmp = self.dir.join(format!("{RECORD_FILE}.tmp"));
        let contents = serde_json::to_string_pretty(record).context("Failed to serialize record")?;
        write_then_rename(&tmp, &path, contents.as_bytes())?;

        debug!("Saved update record to {}", path.display());
        Ok(())
    }
}

fn write_then_rename(tmp: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(tmp, path)
        .with_context(|| format!("Failed to move record into {}", path.display()))?;
    Ok(())
}
