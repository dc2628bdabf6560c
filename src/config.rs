//! Application-level configuration loading: default match rules, reorder
//! buffer bounds and persistence retry bounds.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::ledger::{DEFAULT_PENDING_CAPACITY, MatchRules};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BABY_FOOT_BACK_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Rules applied when a create request does not override them.
    pub default_rules: MatchRules,
    /// Bounds of the out-of-order event buffer.
    pub reorder: ReorderConfig,
    /// Retry policy of the persistence queue.
    pub persistence: PersistenceConfig,
}

/// Bounds applied while waiting for a missing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderConfig {
    /// Events kept aside per match before ingest is refused.
    pub max_pending_events: usize,
    /// Longest a gap may stay open before the ledger is rebuilt from storage.
    pub max_gap_wait: Duration,
}

/// Retry policy used when appending events to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceConfig {
    /// Attempts per event before a sync failure is reported.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled after every failure.
    pub initial_backoff: Duration,
    /// Upper bound of the retry delay.
    pub max_backoff: Duration,
}

impl PersistenceConfig {
    /// Delay following `current`, capped at [`Self::max_backoff`].
    pub fn next_backoff(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_backoff)
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        winning_score = app_config.default_rules.winning_score,
                        max_pending_events = app_config.reorder.max_pending_events,
                        "loaded configuration"
                    );
                    app_config
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

    /// Parse a configuration document; absent sections keep their defaults.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    rules: RawRules,
    reorder: RawReorder,
    persistence: RawPersistence,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawRules {
    winning_score: u32,
    allow_undo_after_win: bool,
}

impl Default for RawRules {
    fn default() -> Self {
        let rules = MatchRules::default();
        Self {
            winning_score: rules.winning_score,
            allow_undo_after_win: rules.allow_undo_after_win,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawReorder {
    max_pending_events: usize,
    max_gap_wait_ms: u64,
}

impl Default for RawReorder {
    fn default() -> Self {
        Self {
            max_pending_events: DEFAULT_PENDING_CAPACITY,
            max_gap_wait_ms: 2_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawPersistence {
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl Default for RawPersistence {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            default_rules: MatchRules {
                winning_score: value.rules.winning_score.max(1),
                allow_undo_after_win: value.rules.allow_undo_after_win,
            },
            reorder: ReorderConfig {
                max_pending_events: value.reorder.max_pending_events.max(1),
                max_gap_wait: Duration::from_millis(value.reorder.max_gap_wait_ms),
            },
            persistence: PersistenceConfig {
                max_attempts: value.persistence.max_attempts.max(1),
                initial_backoff: Duration::from_millis(value.persistence.initial_backoff_ms),
                max_backoff: Duration::from_millis(value.persistence.max_backoff_ms),
            },
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
    fn missing_sections_keep_defaults() {
        let config = AppConfig::from_json(r#"{"rules": {"winning_score": 10}}"#).unwrap();
        assert_eq!(config.default_rules.winning_score, 10);
        assert!(config.default_rules.allow_undo_after_win);
        assert_eq!(config.reorder, AppConfig::default().reorder);
        assert_eq!(config.persistence.max_attempts, 5);
    }

    #[test]
    fn zero_bounds_are_clamped() {
        let config = AppConfig::from_json(
            r#"{"rules": {"winning_score": 0}, "reorder": {"max_pending_events": 0}, "persistence": {"max_attempts": 0}}"#,
        )
        .unwrap();
        assert_eq!(config.default_rules.winning_score, 1);
        assert_eq!(config.reorder.max_pending_events, 1);
        assert_eq!(config.persistence.max_attempts, 1);
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let persistence = AppConfig::default().persistence;
        assert_eq!(
            persistence.next_backoff(Duration::from_millis(200)),
            Duration::from_millis(400)
        );
        assert_eq!(
            persistence.next_backoff(Duration::from_secs(4)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(AppConfig::from_json("{ not json").is_err());
    }
}
