//! The self-update control loop: Idle → Checking → (Idle | Syncing) → (Idle | Restarting).
//!
//! One cycle runs to completion before the next tick is awaited, so tracker
//! and synchronizer calls never overlap. Failures of either are logged and
//! the loop keeps ticking; only `Restarting` ends the loop.

use crate::config::SupervisorConfig;
use crate::types::{
    CycleOutcome, LoopExit, RevisionPointer, SupervisorState, SyncOutcome, UpdateCheckResult,
};
use crate::upstream::{Synchronizer, UpdateTracker};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Owns the running revision and drives the tracker and synchronizer.
pub struct Supervisor<T, S> {
    tracker: T,
    sync: S,
    current: RevisionPointer,
    state: SupervisorState,
    poll_interval: Duration,
    check_timeout: Duration,
    ticks: u64,
}

impl<T, S> Supervisor<T, S>
where
    T: UpdateTracker,
    S: Synchronizer,
{
    pub fn new(config: &SupervisorConfig, tracker: T, sync: S, current: RevisionPointer) -> Self {
        Self {
            tracker,
            sync,
            current,
            state: SupervisorState::Idle,
            poll_interval: config.poll_interval(),
            check_timeout: config.git_timeout(),
            ticks: 0,
        }
    }

    /// Revision this incarnation is running. Fixed until restart.
    pub fn current_revision(&self) -> &RevisionPointer {
        &self.current
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Tick until a new revision is applied or `cancel` fires.
    ///
    /// The stop signal is honoured only while idle; a cycle that already
    /// started finishes within its timeout budget first.
    pub async fn run(&mut self, cancel: CancellationToken) -> LoopExit {
        info!(
            revision = %self.current.short(),
            interval_secs = self.poll_interval.as_secs(),
            "Supervisor loop started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.state = SupervisorState::Idle;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(revision = %self.current.short(), "Stop requested, leaving supervisor loop");
                    return LoopExit::Stopped;
                }
                _ = ticker.tick() => {}
            }

            if let CycleOutcome::Applied(applied) = self.run_cycle().await {
                return LoopExit::Restart {
                    previous: self.current.clone(),
                    applied,
                };
            }
        }
    }

    /// One check-then-maybe-sync cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.ticks += 1;
        self.state = SupervisorState::Checking;
        info!(tick = self.ticks, revision = %self.current.short(), "Checking for updates");

        let checked =
            tokio::time::timeout(self.check_timeout, self.tracker.check_for_update(&self.current))
                .await;

        let target = match checked {
            Ok(Ok(UpdateCheckResult::NoChange)) => {
                info!(tick = self.ticks, revision = %self.current.short(), "No change on remote");
                return self.settle(CycleOutcome::Unchanged);
            }
            Ok(Ok(UpdateCheckResult::ChangeAvailable(target))) => target,
            Ok(Err(e)) => {
                warn!(tick = self.ticks, phase = "check", "Update check failed: {e}");
                return self.settle(CycleOutcome::CheckFailed);
            }
            Err(_) => {
                warn!(
                    tick = self.ticks,
                    phase = "check",
                    "Update check timed out after {:?}", self.check_timeout
                );
                return self.settle(CycleOutcome::CheckFailed);
            }
        };

        info!(
            tick = self.ticks,
            current = %self.current.short(),
            remote = %target.short(),
            "Change detected on remote"
        );

        self.state = SupervisorState::Syncing;
        match self.sync.apply(&target).await {
            SyncOutcome::Applied(applied) => {
                info!(
                    tick = self.ticks,
                    previous = %self.current.short(),
                    revision = %applied.short(),
                    "Sync applied"
                );
                self.settle(CycleOutcome::Applied(applied))
            }
            SyncOutcome::Failed(e) => {
                error!(
                    tick = self.ticks,
                    phase = e.phase(),
                    revision = %target.short(),
                    "Sync failed, will retry next tick: {e}"
                );
                self.settle(CycleOutcome::SyncFailed { target })
            }
        }
    }

    fn settle(&mut self, outcome: CycleOutcome) -> CycleOutcome {
        self.state = outcome.next_state();
        outcome
    }
}
