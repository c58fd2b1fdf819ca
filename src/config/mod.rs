//! Configuration loading for the school operations core.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `SCHOOL_OPS_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix shared by every recognised environment variable.
pub const ENV_PREFIX: &str = "SCHOOL_OPS_";

/// Application configuration derived from `SCHOOL_OPS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Load the sample schools, issues and shipments on startup.
    #[serde(default = "default_seed_sample_data")]
    pub seed_sample_data: bool,
    /// Open issues older than each threshold are counted in `aging.over_<N>_days`.
    #[serde(default = "default_aging_thresholds_days")]
    pub aging_thresholds_days: Vec<u32>,
    #[serde(default = "default_recent_issues_limit")]
    pub recent_issues_limit: usize,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    /// Actor recorded for seeding and command-line writes.
    #[serde(default = "default_system_user_id")]
    pub system_user_id: String,
    #[serde(default = "default_system_user_name")]
    pub system_user_name: String,
}

/// Stats snapshot cadence and history size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SnapshotConfig {
    /// Environment variable: `SCHOOL_OPS_SNAPSHOT_INTERVAL_SECONDS`
    #[serde(default = "default_snapshot_interval_seconds")]
    pub interval_seconds: u64,
    /// Snapshots kept per stats kind.
    ///
    /// Environment variable: `SCHOOL_OPS_SNAPSHOT_RETENTION`
    #[serde(default = "default_snapshot_retention")]
    pub retention: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            seed_sample_data: default_seed_sample_data(),
            aging_thresholds_days: default_aging_thresholds_days(),
            recent_issues_limit: default_recent_issues_limit(),
            snapshots: SnapshotConfig::default(),
            system_user_id: default_system_user_id(),
            system_user_name: default_system_user_name(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_snapshot_interval_seconds(),
            retention: default_snapshot_retention(),
        }
    }
}

impl SnapshotConfig {
    /// Validate snapshot configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_seconds < 60 {
            return Err(ConfigError::InvalidSnapshotInterval {
                value: self.interval_seconds,
            });
        }
        if !(1..=10_000).contains(&self.retention) {
            return Err(ConfigError::InvalidSnapshotRetention {
                value: self.retention,
            });
        }
        Ok(())
    }
}

impl AppConfig {
    /// Returns a JSON representation suitable for logging.
    ///
    /// The system user name is masked; ids are kept so audit entries can be correlated.
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.system_user_name.is_empty() {
            config.system_user_name = "[REDACTED]".to_string();
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        if self.aging_thresholds_days.is_empty() || self.aging_thresholds_days.contains(&0) {
            return Err(ConfigError::InvalidAgingThresholds {
                value: format!("{:?}", self.aging_thresholds_days),
            });
        }

        if !(1..=100).contains(&self.recent_issues_limit) {
            return Err(ConfigError::InvalidRecentIssuesLimit {
                value: self.recent_issues_limit,
            });
        }

        if self.system_user_id.trim().is_empty() || self.system_user_name.trim().is_empty() {
            return Err(ConfigError::MissingSystemUser);
        }

        self.snapshots.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_seed_sample_data() -> bool {
    true
}

fn default_aging_thresholds_days() -> Vec<u32> {
    vec![3, 7]
}

fn default_recent_issues_limit() -> usize {
    5
}

fn default_snapshot_interval_seconds() -> u64 {
    86_400
}

fn default_snapshot_retention() -> usize {
    90
}

fn default_system_user_id() -> String {
    "USR-000".to_string()
}

fn default_system_user_name() -> String {
    "System".to_string()
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid value '{value}' for SCHOOL_OPS_{key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("aging thresholds must be a non-empty list of positive day counts, got {value}")]
    InvalidAgingThresholds { value: String },
    #[error("recent issues limit must be between 1 and 100, got {value}")]
    InvalidRecentIssuesLimit { value: usize },
    #[error("snapshot interval must be at least 60 seconds, got {value}")]
    InvalidSnapshotInterval { value: u64 },
    #[error("snapshot retention must be between 1 and 10000, got {value}")]
    InvalidSnapshotRetention { value: usize },
    #[error(
        "system user is missing; set SCHOOL_OPS_SYSTEM_USER_ID and SCHOOL_OPS_SYSTEM_USER_NAME"
    )]
    MissingSystemUser,
}

/// Loads configuration using layered `.env` files and `SCHOOL_OPS_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.<profile>`, `.env.<profile>.local`,
    /// then the process environment, later layers winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_text(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let log_level = take_text(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take_text(&mut layered, "LOG_FORMAT")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_else(default_log_format);
        let seed_sample_data = take_parsed(&mut layered, "SEED_SAMPLE_DATA", parse_bool)?
            .unwrap_or_else(default_seed_sample_data);
        let aging_thresholds_days =
            take_parsed(&mut layered, "AGING_THRESHOLDS_DAYS", parse_day_list)?
                .unwrap_or_else(default_aging_thresholds_days);
        let recent_issues_limit = take_parsed(&mut layered, "RECENT_ISSUES_LIMIT", parse_number)?
            .unwrap_or_else(default_recent_issues_limit);
        let interval_seconds =
            take_parsed(&mut layered, "SNAPSHOT_INTERVAL_SECONDS", parse_number)?
                .unwrap_or_else(default_snapshot_interval_seconds);
        let retention = take_parsed(&mut layered, "SNAPSHOT_RETENTION", parse_number)?
            .unwrap_or_else(default_snapshot_retention);
        let system_user_id =
            take_text(&mut layered, "SYSTEM_USER_ID").unwrap_or_else(default_system_user_id);
        let system_user_name =
            take_text(&mut layered, "SYSTEM_USER_NAME").unwrap_or_else(default_system_user_name);

        let config = AppConfig {
            profile,
            log_level,
            log_format,
            seed_sample_data,
            aging_thresholds_days,
            recent_issues_limit,
            snapshots: SnapshotConfig {
                interval_seconds,
                retention,
            },
            system_user_id,
            system_user_name,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{}PROFILE", ENV_PREFIX))
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_text(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn take_parsed<T>(
    layered: &mut BTreeMap<String, String>,
    key: &str,
    parse: fn(&str) -> Result<T, String>,
) -> Result<Option<T>, ConfigError> {
    match take_text(layered, key) {
        None => Ok(None),
        Some(raw) => parse(&raw)
            .map(Some)
            .map_err(|reason| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
                reason,
            }),
    }
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("expected true or false".to_string()),
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|err| err.to_string())
}

/// Comma-separated day counts, deduplicated and sorted.
fn parse_day_list(raw: &str) -> Result<Vec<u32>, String> {
    let mut days = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u32>().map_err(|err| format!("'{}': {}", s, err)))
        .collect::<Result<Vec<_>, _>>()?;
    days.sort_unstable();
    days.dedup();
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.aging_thresholds_days, vec![3, 7]);
        assert_eq!(config.snapshots.interval_seconds, 86_400);
        assert_eq!(config.snapshots.retention, 90);
    }

    #[test]
    fn test_snapshot_bounds() {
        let mut config = AppConfig::default();
        config.snapshots.interval_seconds = 59;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSnapshotInterval { value: 59 })
        ));

        let mut config = AppConfig::default();
        config.snapshots.retention = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSnapshotRetention { value: 0 })
        ));
    }

    #[test]
    fn test_log_format_and_recent_limit_bounds() {
        let mut config = AppConfig::default();
        config.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.recent_issues_limit = 101;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRecentIssuesLimit { value: 101 })
        ));
    }

    #[test]
    fn test_parse_day_list() {
        assert_eq!(parse_day_list("7, 3,3,14").unwrap(), vec![3, 7, 14]);
        assert!(parse_day_list("3,soon").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Ok(true));
        assert_eq!(parse_bool("off"), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_redacted_json_masks_user_name() {
        let json = AppConfig::default().redacted_json().unwrap();
        assert!(json.contains("[REDACTED]"));
        assert!(json.contains("USR-000"));
        assert!(!json.contains("\"System\""));
    }
}
