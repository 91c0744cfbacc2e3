pub mod daemon;

pub use daemon::HeartbeatDaemon;
