//! Server configuration.
//!
//! Defaults suit local development. Deployments override them with a few
//! environment variables:
//!
//! - `RALLY_BIND_ADDR`               (default: "127.0.0.1:8080")
//! - `RALLY_DB_PATH`                 (default: unset, in-memory database)
//! - `RALLY_SWEEP_INTERVAL_SECS`     (default: 60)
//! - `RALLY_COMMAND_RETENTION_SECS`  (default: 604800, seven days)
//! - `RALLY_IDLE_TIMEOUT_SECS`       (default: 60)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rallypoint_room::StoreConfig;

use crate::RallyError;

/// Everything a [`RallyServer`](crate::RallyServer) needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` the WebSocket listener binds to.
    pub bind_addr: String,

    /// SQLite file. `None` keeps everything in memory, which is lost on
    /// restart.
    pub db_path: Option<PathBuf>,

    /// How often the expiry sweep runs.
    pub sweep_interval: Duration,

    /// How long command log rows and closed rooms are kept.
    pub command_retention: Duration,

    /// A connection that sends nothing for this long is dropped. Clients
    /// are expected to heartbeat well inside it.
    pub idle_timeout: Duration,

    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            db_path: None,
            sweep_interval: Duration::from_secs(60),
            command_retention: Duration::from_secs(7 * 24 * 60 * 60),
            idle_timeout: Duration::from_secs(60),
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Builds a config from the process environment, falling back to
    /// defaults for anything unset.
    ///
    /// # Errors
    /// [`RallyError::Config`] if a variable is set but doesn't parse.
    pub fn from_env() -> Result<Self, RallyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RallyError> {
        let defaults = Self::default();

        let bind_addr = lookup("RALLY_BIND_ADDR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.bind_addr);
        let db_path = lookup("RALLY_DB_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let sweep_interval = read_secs_or_default(
            &lookup,
            "RALLY_SWEEP_INTERVAL_SECS",
            defaults.sweep_interval,
        )?;
        let command_retention = read_secs_or_default(
            &lookup,
            "RALLY_COMMAND_RETENTION_SECS",
            defaults.command_retention,
        )?;
        let idle_timeout =
            read_secs_or_default(&lookup, "RALLY_IDLE_TIMEOUT_SECS", defaults.idle_timeout)?;

        if sweep_interval.is_zero() {
            return Err(RallyError::Config("RALLY_SWEEP_INTERVAL_SECS must be positive".into()));
        }
        if idle_timeout.is_zero() {
            return Err(RallyError::Config("RALLY_IDLE_TIMEOUT_SECS must be positive".into()));
        }

        Ok(Self {
            bind_addr,
            db_path,
            sweep_interval,
            command_retention,
            idle_timeout,
            store: defaults.store,
        })
    }
}

fn read_secs_or_default(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, RallyError> {
    read_or_default(lookup, key, default.as_secs()).map(Duration::from_secs)
}

fn read_or_default<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, RallyError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(val) => val
            .trim()
            .parse::<T>()
            .map_err(|e| RallyError::Config(format!("{key}={val:?}: {e}"))),
        None => Ok(default),
    }
}
