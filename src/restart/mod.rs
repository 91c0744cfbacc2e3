//! Hand the process over to its next incarnation.
//!
//! Either exit with [`EXIT_RESTART`] so the process manager relaunches us, or
//! re-exec the current binary in place. Code is never reloaded in-process.

use crate::config::RestartMode;
use crate::error::RestartError;
use crate::types::exit_codes::EXIT_RESTART;
use crate::types::RevisionPointer;
use tracing::{info, warn};

/// Performs the `Restarting` transition.
#[derive(Debug, Clone, Copy)]
pub struct Restarter {
    mode: RestartMode,
}

impl Restarter {
    pub fn new(mode: RestartMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> RestartMode {
        self.mode
    }

    /// Returns the exit code the caller must terminate with. In `exec` mode
    /// this only returns on failure.
    pub fn handover(&self, applied: &RevisionPointer) -> Result<i32, RestartError> {
        info!(revision = %applied.short(), mode = %self.mode, "Restart initiated");
        match self.mode {
            RestartMode::Exit => Ok(EXIT_RESTART),
            RestartMode::Exec => reexec(),
        }
    }
}

#[cfg(unix)]
fn reexec() -> Result<i32, RestartError> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().map_err(RestartError::CurrentExe)?;
    let args: Vec<_> = std::env::args_os().skip(1).collect();
    let source = std::process::Command::new(&exe).args(args).exec();
    Err(RestartError::Exec { exe, source })
}

#[cfg(not(unix))]
fn reexec() -> Result<i32, RestartError> {
    warn!("exec restart is not supported on this platform, exiting for relaunch instead");
    Ok(EXIT_RESTART)
}

/// Log how a new incarnation came to be, based on the persisted record.
pub fn log_incarnation(current: &RevisionPointer, last: Option<&crate::state::UpdateRecord>) {
    match last {
        Some(record) if &record.revision == current => info!(
            revision = %current.short(),
            previous = %record.previous.short(),
            incarnation = record.incarnation,
            "Started after update"
        ),
        Some(record) => warn!(
            revision = %current.short(),
            recorded = %record.revision.short(),
            "Working copy differs from the last applied update"
        ),
        None => info!(revision = %current.short(), "Started"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_mode_requests_restart_code() {
        let restarter = Restarter::new(RestartMode::Exit);
        let code = restarter.handover(&RevisionPointer::new("b")).unwrap();
        assert_eq!(code, EXIT_RESTART);
    }
}
