//! Application-level configuration loading: matchmaking, presence and room timing knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ROOM_SYNC_CONFIG_PATH";

const MIN_CODE_LENGTH: usize = 4;
const MAX_CODE_LENGTH: usize = 8;

/// What happens when a participant lets the turn clock run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnTimeoutPolicy {
    /// The authority passes the turn on, when the game allows it.
    Skip,
    /// The idle participant loses.
    #[default]
    Forfeit,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Bounded wait of `find_match`.
    pub search_timeout: Duration,
    /// Period of the presence beacon.
    pub heartbeat_interval: Duration,
    /// Silence after which a playing participant is forced to forfeit.
    pub heartbeat_timeout: Duration,
    /// Per-turn clock; `None` disables it.
    pub turn_timeout: Option<Duration>,
    /// Applied when the per-turn clock runs out.
    pub turn_timeout_policy: TurnTimeoutPolicy,
    /// Length of private room codes.
    pub code_length: usize,
    /// Resubscribe attempts before a session gives up with "connection lost".
    pub resubscribe_budget: u32,
    /// Per-room broadcast channel capacity.
    pub bus_capacity: usize,
    /// Age after which closed rooms are deleted and idle waiting rooms abandoned.
    pub room_retention: Duration,
    /// Period of the room reaper.
    pub reaper_interval: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        search_timeout_secs = config.search_timeout.as_secs(),
                        code_length = config.code_length,
                        "loaded room configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; missing keys keep their default value.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(20),
            turn_timeout: None,
            turn_timeout_policy: TurnTimeoutPolicy::default(),
            code_length: MIN_CODE_LENGTH,
            resubscribe_budget: 3,
            bus_capacity: 64,
            room_retention: Duration::from_secs(60 * 60),
            reaper_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    search_timeout_secs: Option<u64>,
    heartbeat_interval_ms: Option<u64>,
    heartbeat_timeout_ms: Option<u64>,
    turn_timeout_secs: Option<u64>,
    turn_timeout_policy: Option<TurnTimeoutPolicy>,
    code_length: Option<usize>,
    resubscribe_budget: Option<u32>,
    bus_capacity: Option<usize>,
    room_retention_secs: Option<u64>,
    reaper_interval_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let code_length = match value.code_length {
            Some(length) if (MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&length) => length,
            Some(length) => {
                warn!(
                    code_length = length,
                    "room code length out of range; using default"
                );
                defaults.code_length
            }
            None => defaults.code_length,
        };

        Self {
            search_timeout: value
                .search_timeout_secs
                .map_or(defaults.search_timeout, Duration::from_secs),
            heartbeat_interval: value
                .heartbeat_interval_ms
                .map_or(defaults.heartbeat_interval, Duration::from_millis),
            heartbeat_timeout: value
                .heartbeat_timeout_ms
                .map_or(defaults.heartbeat_timeout, Duration::from_millis),
            turn_timeout: value
                .turn_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            turn_timeout_policy: value
                .turn_timeout_policy
                .unwrap_or(defaults.turn_timeout_policy),
            code_length,
            resubscribe_budget: value
                .resubscribe_budget
                .unwrap_or(defaults.resubscribe_budget),
            bus_capacity: value
                .bus_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.bus_capacity),
            room_retention: value
                .room_retention_secs
                .map_or(defaults.room_retention, Duration::from_secs),
            reaper_interval: value
                .reaper_interval_secs
                .filter(|secs| *secs > 0)
                .map_or(defaults.reaper_interval, Duration::from_secs),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_keeps_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        let defaults = AppConfig::default();
        assert_eq!(config.search_timeout, defaults.search_timeout);
        assert_eq!(config.code_length, 4);
        assert_eq!(config.turn_timeout, None);
        assert_eq!(config.turn_timeout_policy, TurnTimeoutPolicy::Forfeit);
    }

    #[test]
    fn overrides_are_applied() {
        let config = AppConfig::from_json(
            r#"{
                "search_timeout_secs": 5,
                "heartbeat_timeout_ms": 1500,
                "turn_timeout_secs": 30,
                "turn_timeout_policy": "skip",
                "code_length": 6
            }"#,
        )
        .unwrap();
        assert_eq!(config.search_timeout, Duration::from_secs(5));
        assert_eq!(config.heartbeat_timeout, Duration::from_millis(1500));
        assert_eq!(config.turn_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.turn_timeout_policy, TurnTimeoutPolicy::Skip);
        assert_eq!(config.code_length, 6);
    }

    #[test]
    fn out_of_range_code_length_falls_back() {
        let config = AppConfig::from_json(r#"{"code_length": 2}"#).unwrap();
        assert_eq!(config.code_length, 4);
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(AppConfig::from_json("[").is_err());
        assert!(AppConfig::from_json(r#"{"turn_timeout_policy": "nap"}"#).is_err());
    }
}
