//! Configuration schema for the supervisor (TOML file + environment overrides).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for the derived git timeout when none is configured.
const DEFAULT_GIT_TIMEOUT_SECS: u64 = 20;

/// Log verbosity accepted in config and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "unknown log level '{other}' (expected trace, debug, info, warn or error)"
            )),
        }
    }
}

/// How the process hands over to its next incarnation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    /// Exit with the restart code and let the process manager relaunch.
    Exit,
    /// Replace the process image in place.
    Exec,
}

impl fmt::Display for RestartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit => write!(f, "exit"),
            Self::Exec => write!(f, "exec"),
        }
    }
}

impl FromStr for RestartMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exit" => Ok(Self::Exit),
            "exec" => Ok(Self::Exec),
            other => Err(format!("unknown restart mode '{other}' (expected exit or exec)")),
        }
    }
}

/// Root configuration. Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Remote repository to track.
    pub repo_url: String,

    /// Branch whose tip is followed.
    pub branch: String,

    /// Seconds between update checks.
    pub poll_interval_secs: u64,

    /// Log verbosity.
    pub log_level: LogLevel,

    /// Local working copy the supervised process runs from.
    pub repo_path: String,

    /// Per-call bound on git network work. Derived from the poll interval when unset.
    pub git_timeout_secs: Option<u64>,

    /// Seconds between "still running" log lines (0 disables).
    pub heartbeat_interval_secs: u64,

    /// Restart strategy after a successful update.
    pub restart_mode: RestartMode,

    /// Where the last-update record is kept. Empty selects the platform default.
    pub state_dir: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            repo_url: String::new(),
            branch: "main".into(),
            poll_interval_secs: 30,
            log_level: LogLevel::Info,
            repo_path: ".".into(),
            git_timeout_secs: None,
            heartbeat_interval_secs: 60,
            restart_mode: RestartMode::Exit,
            state_dir: String::new(),
        }
    }
}

impl SupervisorConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).into_owned())
    }

    /// Resolved working copy path.
    pub fn resolved_repo_path(&self) -> PathBuf {
        self.resolve_path(&self.repo_path)
    }

    /// Resolved state directory.
    pub fn resolved_state_dir(&self) -> PathBuf {
        if !self.state_dir.is_empty() {
            return self.resolve_path(&self.state_dir);
        }
        directories::ProjectDirs::from("", "", "mycelium")
            .map(|d| d.data_local_dir().to_path_buf())
            .unwrap_or_else(|| self.resolved_repo_path().join(".mycelium"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Effective bound for a single tracker or synchronizer call.
    pub fn git_timeout(&self) -> Duration {
        let secs = self.git_timeout_secs.unwrap_or_else(|| {
            DEFAULT_GIT_TIMEOUT_SECS.min(self.poll_interval_secs.saturating_sub(1))
        });
        Duration::from_secs(secs.max(1))
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_secs > 0).then(|| Duration::from_secs(self.heartbeat_interval_secs))
    }

    /// Reject values that would make every check fail or let ticks overlap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repo_url.trim().is_empty() {
            return Err(ConfigError::Missing { key: "repo_url" });
        }
        validate_repo_url(&self.repo_url).map_err(|r| ConfigError::invalid("repo_url", r))?;

        validate_branch(&self.branch).map_err(|r| ConfigError::invalid("branch", r))?;

        if self.poll_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "poll_interval_secs",
                "must be a positive number of seconds",
            ));
        }

        match self.git_timeout_secs {
            Some(0) => {
                return Err(ConfigError::invalid("git_timeout_secs", "must be positive"));
            }
            Some(t) if t >= self.poll_interval_secs => {
                return Err(ConfigError::invalid(
                    "git_timeout_secs",
                    format!(
                        "{t}s must be shorter than the poll interval ({}s)",
                        self.poll_interval_secs
                    ),
                ));
            }
            None if self.poll_interval_secs < 2 => {
                return Err(ConfigError::invalid(
                    "poll_interval_secs",
                    "must be at least 2s so git calls can finish before the next tick",
                ));
            }
            _ => {}
        }

        if self.repo_path.trim().is_empty() {
            return Err(ConfigError::invalid("repo_path", "must not be empty"));
        }

        Ok(())
    }
}

/// Accepts the remote forms git understands: scheme URLs, scp-like
/// `user@host:path`, and absolute local paths.
pub fn validate_repo_url(url: &str) -> Result<(), String> {
    // Passed to git verbatim, so padding is rejected rather than trimmed.
    if url.chars().any(char::is_whitespace) {
        return Err(format!("'{url}' contains whitespace"));
    }
    if url.starts_with('-') {
        return Err(format!("'{url}' must not start with '-'"));
    }

    if let Some((scheme, rest)) = url.split_once("://") {
        return match scheme {
            "https" | "http" | "ssh" | "git" => {
                let authority = rest.split('/').next().unwrap_or_default();
                let host = authority.rsplit('@').next().unwrap_or_default();
                let host = host.split(':').next().unwrap_or_default();
                if host.is_empty() {
                    Err(format!("'{url}' has no host"))
                } else if rest.len() <= authority.len() + 1 {
                    Err(format!("'{url}' has no repository path"))
                } else {
                    Ok(())
                }
            }
            "file" => {
                if rest.trim_start_matches('/').is_empty() {
                    Err(format!("'{url}' has no path"))
                } else {
                    Ok(())
                }
            }
            other => Err(format!("unsupported scheme '{other}'")),
        };
    }

    if url.starts_with('/') {
        return Ok(());
    }

    // scp-like: [user@]host:path
    if let Some((host, path)) = url.split_once(':') {
        let host = host.rsplit('@').next().unwrap_or_default();
        if !host.is_empty() && !path.is_empty() && !host.contains('/') {
            return Ok(());
        }
    }

    Err(format!("'{url}' is not a recognised repository URL"))
}

fn validate_branch(branch: &str) -> Result<(), String> {
    if branch.trim().is_empty() {
        return Err("must not be empty".into());
    }
    if branch.starts_with('-') || branch.starts_with('/') || branch.ends_with('/') {
        return Err(format!("'{branch}' is not a valid branch name"));
    }
    if branch.contains("..")
        || branch
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c))
    {
        return Err(format!("'{branch}' contains characters git does not allow"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config_with_url(url: &str) -> SupervisorConfig {
        SupervisorConfig {
            repo_url: url.into(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case("https://github.com/example/agent.git")]
    #[case("ssh://git@github.com/example/agent.git")]
    #[case("git://example.org/agent")]
    #[case("file:///srv/git/agent.git")]
    #[case("git@github.com:example/agent.git")]
    #[case("/srv/git/agent.git")]
    fn accepts_git_remote_forms(#[case] url: &str) {
        assert!(config_with_url(url).validate().is_ok(), "{url} should be valid");
    }

    #[rstest]
    #[case("not a url")]
    #[case("https://")]
    #[case("https://github.com")]
    #[case("ftp://example.org/agent.git")]
    #[case("relative/path")]
    #[case("file://")]
    #[case("-oProxyCommand=evil:x")]
    #[case("https://example.org/agent.git\n")]
    #[case(" /srv/git/agent.git")]
    fn rejects_malformed_urls(#[case] url: &str) {
        let err = config_with_url(url).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "repo_url", .. }), "{url}: {err}");
    }

    #[test]
    fn missing_url_is_reported() {
        let err = SupervisorConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { key: "repo_url" }));
    }

    #[rstest]
    #[case("")]
    #[case("feature..x")]
    #[case("-main")]
    #[case("has space")]
    #[case("main\n")]
    fn rejects_bad_branches(#[case] branch: &str) {
        let cfg = SupervisorConfig {
            branch: branch.into(),
            ..config_with_url("/srv/git/agent.git")
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "branch", .. })
        ));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let cfg = SupervisorConfig {
            poll_interval_secs: 0,
            ..config_with_url("/srv/git/agent.git")
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "poll_interval_secs", .. })
        ));
    }

    #[test]
    fn timeout_must_be_below_poll_interval() {
        let cfg = SupervisorConfig {
            poll_interval_secs: 10,
            git_timeout_secs: Some(10),
            ..config_with_url("/srv/git/agent.git")
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "git_timeout_secs", .. })
        ));
    }

    #[test]
    fn derived_timeout_stays_below_interval() {
        let cfg = SupervisorConfig {
            poll_interval_secs: 5,
            ..config_with_url("/srv/git/agent.git")
        };
        assert_eq!(cfg.git_timeout(), Duration::from_secs(4));

        let cfg = SupervisorConfig {
            poll_interval_secs: 300,
            ..config_with_url("/srv/git/agent.git")
        };
        assert_eq!(cfg.git_timeout(), Duration::from_secs(DEFAULT_GIT_TIMEOUT_SECS));
    }

    #[test]
    fn heartbeat_can_be_disabled() {
        let cfg = SupervisorConfig {
            heartbeat_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(cfg.heartbeat_interval(), None);
    }

    #[test]
    fn explicit_state_dir_wins() {
        let cfg = SupervisorConfig {
            state_dir: "/var/lib/mycelium".into(),
            ..Default::default()
        };
        assert_eq!(cfg.resolved_state_dir(), PathBuf::from("/var/lib/mycelium"));
    }

    #[test]
    fn log_level_parsing() {
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
