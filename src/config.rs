//! Application-level configuration loading and validation.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationErrors};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIVIA_LIVE_BACK_CONFIG_PATH";

const DEFAULT_IDEMPOTENCY_TTL_SECS: i64 = 300;
const DEFAULT_IDEMPOTENCY_MAX_ENTRIES: i64 = 1024;
const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: i64 = 1800;
const DEFAULT_SESSION_SWEEP_INTERVAL_SECS: i64 = 60;
const DEFAULT_COMMAND_TIMEOUT_SECS: i64 = 5;
const DEFAULT_BROADCAST_CAPACITY: i64 = 64;

/// Errors raised while loading the configuration. All of them abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read config `{path}`")]
    Read {
        /// Path that was read.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON for [`RawConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is out of range (every value must be strictly positive).
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationErrors),
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    idempotency_ttl: Duration,
    idempotency_max_entries: usize,
    session_idle_timeout: Duration,
    session_sweep_interval: Duration,
    command_timeout: Duration,
    broadcast_capacity: usize,
}

impl AppConfig {
    /// Load the configuration from disk, using built-in defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let config = Self::from_json_str(&contents)?;
                info!(path = %path.display(), "loaded configuration");
                Ok(config)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(contents)?;
        raw.try_into()
    }

    /// How long a command id is remembered for deduplication.
    pub fn idempotency_ttl(&self) -> Duration {
        self.idempotency_ttl
    }

    /// Maximum remembered command ids per session.
    pub fn idempotency_max_entries(&self) -> usize {
        self.idempotency_max_entries
    }

    /// Inactivity after which a session is evicted.
    pub fn session_idle_timeout(&self) -> Duration {
        self.session_idle_timeout
    }

    /// Period of the idle-session sweep.
    pub fn session_sweep_interval(&self) -> Duration {
        self.session_sweep_interval
    }

    /// Upper bound on waiting for a session lane.
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Capacity of each session's broadcast channel.
    pub fn broadcast_capacity(&self) -> usize {
        self.broadcast_capacity
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default()
            .try_into()
            .unwrap_or_else(|_| unreachable!("built-in defaults are valid"))
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
///
/// Values are signed so that negative inputs surface as validation errors
/// rather than parse errors.
struct RawConfig {
    #[validate(range(min = 1))]
    idempotency_ttl_secs: i64,
    #[validate(range(min = 1))]
    idempotency_max_entries: i64,
    #[validate(range(min = 1))]
    session_idle_timeout_secs: i64,
    #[validate(range(min = 1))]
    session_sweep_interval_secs: i64,
    #[validate(range(min = 1))]
    command_timeout_secs: i64,
    #[validate(range(min = 1))]
    broadcast_capacity: i64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
            idempotency_max_entries: DEFAULT_IDEMPOTENCY_MAX_ENTRIES,
            session_idle_timeout_secs: DEFAULT_SESSION_IDLE_TIMEOUT_SECS,
            session_sweep_interval_secs: DEFAULT_SESSION_SWEEP_INTERVAL_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

impl TryFrom<RawConfig> for AppConfig {
    type Error = ConfigError;

    fn try_from(value: RawConfig) -> Result<Self, Self::Error> {
        value.validate()?;
        // Range validation guarantees every value is positive.
        let secs = |value: i64| Duration::from_secs(value.unsigned_abs());
        let count = |value: i64| usize::try_from(value).unwrap_or(usize::MAX);
        Ok(Self {
            idempotency_ttl: secs(value.idempotency_ttl_secs),
            idempotency_max_entries: count(value.idempotency_max_entries),
            session_idle_timeout: secs(value.session_idle_timeout_secs),
            session_sweep_interval: secs(value.session_sweep_interval_secs),
            command_timeout: secs(value.command_timeout_secs),
            broadcast_capacity: count(value.broadcast_capacity),
        })
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
