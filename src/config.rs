use chrono_tz::Tz;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tracker::commands::ReportSettings;
use crate::tracker::line::DEFAULT_API_BASE;
use crate::tracker::membership::SyncPolicy;
use crate::tracker::TrackerConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Required environment variable is unset or empty.
    MissingEnv(&'static str),
    /// Unknown IANA timezone name.
    InvalidTimezone(String),
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::MissingEnv(name) => write!(f, "environment variable {} is required", name),
            Self::InvalidTimezone(name) => write!(f, "unknown timezone '{}'", name),
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::MissingEnv(_) | Self::InvalidTimezone(_) | Self::Validation(_) => None,
        }
    }
}

pub const ENV_ACCESS_TOKEN: &str = "LINE_CHANNEL_ACCESS_TOKEN";
pub const ENV_CHANNEL_SECRET: &str = "LINE_CHANNEL_SECRET";
pub const ENV_BOT_USER_ID: &str = "LINE_BOT_USER_ID";
pub const ENV_PORT: &str = "PORT";

/// Optional tunables file. Secrets never live here; they come from the environment.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    /// Directory for the database and logs. Defaults to current directory.
    data_dir: Option<String>,
    port: Option<u16>,
    /// Members quiet for longer than this are reported as inactive.
    #[serde(default = "default_inactive_threshold_secs")]
    inactive_threshold_secs: u64,
    #[serde(default = "default_sync_attempts")]
    sync_attempts: u32,
    #[serde(default = "default_sync_backoff_ms")]
    sync_backoff_ms: u64,
    /// Pause between profile fetches while scanning a group.
    #[serde(default = "default_sync_fetch_delay_ms")]
    sync_fetch_delay_ms: u64,
    #[serde(default = "default_heal_min_members")]
    heal_min_members: usize,
    #[serde(default = "default_max_report_entries")]
    max_report_entries: usize,
    /// IANA timezone for dates in replies.
    #[serde(default = "default_timezone")]
    timezone: String,
    /// LINE API base URL (for proxies and local testing).
    #[serde(default = "default_api_base")]
    api_base: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            data_dir: None,
            port: None,
            inactive_threshold_secs: default_inactive_threshold_secs(),
            sync_attempts: default_sync_attempts(),
            sync_backoff_ms: default_sync_backoff_ms(),
            sync_fetch_delay_ms: default_sync_fetch_delay_ms(),
            heal_min_members: default_heal_min_members(),
            max_report_entries: default_max_report_entries(),
            timezone: default_timezone(),
            api_base: default_api_base(),
        }
    }
}

fn default_inactive_threshold_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_sync_attempts() -> u32 {
    3
}

fn default_sync_backoff_ms() -> u64 {
    2000
}

fn default_sync_fetch_delay_ms() -> u64 {
    200
}

fn default_heal_min_members() -> usize {
    2
}

fn default_max_report_entries() -> usize {
    10
}

fn default_timezone() -> String {
    "Asia/Taipei".to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

const DEFAULT_PORT: u16 = 5000;

/// Ten years.
const MAX_THRESHOLD_SECS: u64 = 10 * 365 * 24 * 60 * 60;

pub struct Config {
    pub channel_access_token: String,
    pub channel_secret: String,
    /// The bot's own user ID; excluded from membership scans.
    pub bot_user_id: Option<String>,
    pub port: u16,
    /// Directory for the database and logs.
    pub data_dir: PathBuf,
    pub api_base: String,
    pub inactive_threshold: chrono::Duration,
    pub sync_attempts: u32,
    pub sync_backoff: Duration,
    pub sync_fetch_delay: Duration,
    pub heal_min_members: usize,
    pub max_report_entries: usize,
    pub timezone: Tz,
}

impl Config {
    /// Load tunables from `path` (if given) and secrets from `env`.
    pub fn load<F>(path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match path {
            Some(path) => {
                let config_path = path.to_path_buf();
                let content = std::fs::read_to_string(&config_path)
                    .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
                serde_json::from_str(&content)
                    .map_err(|e| ConfigError::ParseJson { path: config_path, source: e })?
            }
            None => ConfigFile::default(),
        };

        // Empty values count as unset
        let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let channel_access_token =
            env(ENV_ACCESS_TOKEN).ok_or(ConfigError::MissingEnv(ENV_ACCESS_TOKEN))?;
        let channel_secret =
            env(ENV_CHANNEL_SECRET).ok_or(ConfigError::MissingEnv(ENV_CHANNEL_SECRET))?;
        let bot_user_id = env(ENV_BOT_USER_ID);

        let port = match env(ENV_PORT) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Validation(format!("{ENV_PORT} is not a valid port: {raw}")))?,
            None => file.port.unwrap_or(DEFAULT_PORT),
        };

        if file.sync_attempts == 0 {
            return Err(ConfigError::Validation("sync_attempts must be at least 1".into()));
        }
        if file.inactive_threshold_secs == 0 || file.inactive_threshold_secs > MAX_THRESHOLD_SECS {
            return Err(ConfigError::Validation(format!(
                "inactive_threshold_secs must be between 1 and {MAX_THRESHOLD_SECS}"
            )));
        }
        if file.max_report_entries == 0 {
            return Err(ConfigError::Validation("max_report_entries must be positive".into()));
        }

        let timezone: Tz = file
            .timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(file.timezone.clone()))?;

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            channel_access_token,
            channel_secret,
            bot_user_id,
            port,
            data_dir,
            api_base: file.api_base,
            inactive_threshold: chrono::Duration::seconds(file.inactive_threshold_secs as i64),
            sync_attempts: file.sync_attempts,
            sync_backoff: Duration::from_millis(file.sync_backoff_ms),
            sync_fetch_delay: Duration::from_millis(file.sync_fetch_delay_ms),
            heal_min_members: file.heal_min_members,
            max_report_entries: file.max_report_entries,
            timezone,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("user_tracker.db")
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            bot_user_id: self.bot_user_id.clone(),
            sync: SyncPolicy {
                attempts: self.sync_attempts,
                backoff: self.sync_backoff,
                fetch_delay: self.sync_fetch_delay,
            },
            report: ReportSettings {
                inactive_threshold: self.inactive_threshold,
                max_entries: self.max_report_entries,
                heal_min_members: self.heal_min_members,
                timezone: self.timezone,
            },
        }
    }
}
