pub mod schema;

pub use schema::{LogLevel, RestartMode, SupervisorConfig};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Config file looked up in the current directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "mycelium.toml";

/// Load, override from the process environment, and validate.
///
/// An explicitly named file must exist; the default file is optional.
pub fn load(explicit: Option<&Path>) -> Result<SupervisorConfig, ConfigError> {
    load_with_env(explicit, |key| std::env::var(key).ok())
}

/// Same as [`load`] with an injectable environment lookup.
pub fn load_with_env<F>(explicit: Option<&Path>, env: F) -> Result<SupervisorConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match explicit {
        Some(path) => read_file(path)?,
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                read_file(&default_path)?
            } else {
                SupervisorConfig::default()
            }
        }
    };

    apply_env(&mut config, env)?;
    config.validate()?;
    Ok(config)
}

/// Parse a TOML config file without validating it.
pub fn read_file(path: &Path) -> Result<SupervisorConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply `MYCELIUM_*` overrides. Unparsable values fail instead of being ignored.
pub fn apply_env<F>(config: &mut SupervisorConfig, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = env("MYCELIUM_REPO_URL") {
        config.repo_url = v.trim().to_string();
    }
    if let Some(v) = env("MYCELIUM_BRANCH") {
        config.branch = v.trim().to_string();
    }
    if let Some(v) = env("MYCELIUM_POLL_INTERVAL") {
        config.poll_interval_secs = parse_env("poll_interval_secs", &v)?;
    }
    if let Some(v) = env("MYCELIUM_LOG_LEVEL") {
        config.log_level = parse_env("log_level", &v)?;
    }
    if let Some(v) = env("MYCELIUM_REPO_PATH") {
        config.repo_path = v;
    }
    if let Some(v) = env("MYCELIUM_GIT_TIMEOUT") {
        config.git_timeout_secs = Some(parse_env("git_timeout_secs", &v)?);
    }
    if let Some(v) = env("MYCELIUM_HEARTBEAT_INTERVAL") {
        config.heartbeat_interval_secs = parse_env("heartbeat_interval_secs", &v)?;
    }
    if let Some(v) = env("MYCELIUM_RESTART_MODE") {
        config.restart_mode = parse_env("restart_mode", &v)?;
    }
    if let Some(v) = env("MYCELIUM_STATE_DIR") {
        config.state_dir = v;
    }
    Ok(())
}

fn parse_env<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::invalid(key, format!("'{raw}': {e}")))
}
