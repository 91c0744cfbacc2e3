//! Periodic "still alive" log line for unattended machines.
//!
//! Runs beside the supervisor loop and shares nothing mutable with it: the
//! revision it reports is fixed for the lifetime of the incarnation.

use crate::config::SupervisorConfig;
use crate::types::RevisionPointer;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Background heartbeat task.
pub struct HeartbeatDaemon {
    interval: Duration,
    revision: RevisionPointer,
    branch: String,
    started: Instant,
    beats: u64,
}

impl HeartbeatDaemon {
    /// `None` when heartbeats are disabled in config.
    pub fn new(config: &SupervisorConfig, revision: RevisionPointer) -> Option<Self> {
        let interval = config.heartbeat_interval()?;
        Some(Self {
            interval,
            revision,
            branch: config.branch.clone(),
            started: Instant::now(),
            beats: 0,
        })
    }

    /// Run until `cancel` fires. Returns the number of heartbeats emitted.
    pub async fn run(mut self, cancel: CancellationToken) -> u64 {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => self.beat(),
                _ = cancel.cancelled() => return self.beats,
            }
        }
    }

    fn beat(&mut self) {
        self.beats += 1;
        info!(
            revision = %self.revision.short(),
            branch = %self.branch,
            uptime_secs = self.started.elapsed().as_secs(),
            "Supervisor running"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(interval: u64) -> SupervisorConfig {
        SupervisorConfig {
            heartbeat_interval_secs: interval,
            ..Default::default()
        }
    }

    #[test]
    fn disabled_when_interval_is_zero() {
        assert!(HeartbeatDaemon::new(&config(0), RevisionPointer::new("a")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn beats_until_cancelled() {
        let daemon = HeartbeatDaemon::new(&config(60), RevisionPointer::new("a")).unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(daemon.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(185)).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), 3);
    }
}
