//! Mycelium — self-updating supervisor.
//!
//! Keeps a deployed agent's working copy in sync with a remote branch and
//! restarts the process whenever new code is applied, so unattended machines
//! update themselves.

pub mod config;
pub mod error;
pub mod git_ops;
pub mod heartbeat;
pub mod restart;
pub mod state;
pub mod supervisor;
pub mod types;
pub mod upstream;
