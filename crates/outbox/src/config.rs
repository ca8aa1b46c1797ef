//! Engine and remote configuration
//!
//! Settings are resolved in this order, later sources overriding earlier:
//! 1. Built-in defaults
//! 2. JSON file (`<config dir>/outbox/outbox.json`)
//! 3. Environment variables (`OUTBOX_*`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::OutboxError;
use crate::storage::DEFAULT_STORAGE_KEY;

/// Settings filename in the Outbox config directory
const SETTINGS_FILE: &str = "outbox.json";

/// Default cap on failed attempts per item
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default time a synced item stays visible before removal
pub const DEFAULT_GRACE_DELAY: Duration = Duration::from_secs(5);

/// Default bound on a single dispatch call
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for one HTTP request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning for the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Total failed attempts after which an item is terminally failed;
    /// at least 1
    pub max_retries: u32,
    /// How long a synced item stays in the queue before removal
    pub grace_delay: Duration,
    /// Upper bound for one dispatch call; `None` waits forever
    pub dispatch_timeout: Option<Duration>,
    /// Key the queue is stored under
    pub storage_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            grace_delay: DEFAULT_GRACE_DELAY,
            dispatch_timeout: Some(DEFAULT_DISPATCH_TIMEOUT),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl EngineConfig {
    /// Reject values the engine cannot honor
    ///
    /// A retry cap of 0 would still allow the first attempt, leaving a failed
    /// item with more attempts than the cap.
    pub fn validate(&self) -> Result<(), OutboxError> {
        if self.max_retries == 0 {
            return Err(OutboxError::InvalidConfig {
                message: "max_retries must be at least 1".to_string(),
            });
        }
        if self.storage_key.trim().is_empty() {
            return Err(OutboxError::InvalidConfig {
                message: "storage_key must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Where and how the HTTP dispatcher delivers mutations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL of the RPC endpoint, e.g. `https://api.example.com/rpc`
    pub base_url: String,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// On-disk settings format; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SettingsFile {
    pub max_retries: Option<u32>,
    pub grace_delay_ms: Option<u64>,
    /// 0 disables the dispatch timeout
    pub dispatch_timeout_ms: Option<u64>,
    pub storage_key: Option<String>,
    pub remote_url: Option<String>,
    pub auth_token: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

/// Fully resolved settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboxSettings {
    pub engine: EngineConfig,
    /// `None` when no remote URL is configured
    pub remote: Option<RemoteConfig>,
}

impl OutboxSettings {
    /// Resolve settings from defaults, the config file and the environment
    pub fn load() -> Result<Self> {
        let file = config::load_json_opt::<SettingsFile>(SETTINGS_FILE)?.unwrap_or_default();
        Self::resolve(file, |name| std::env::var(name).ok())
    }

    /// Resolve settings from a specific JSON file plus the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let file: SettingsFile = config::load_json_file(path)?;
        Self::resolve(file, |name| std::env::var(name).ok())
            .with_context(|| format!("Invalid settings in {}", path.display()))
    }

    fn resolve(file: SettingsFile, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();
        settings.apply_file(file);
        settings.apply_env(var)?;
        settings.engine.validate()?;
        Ok(settings)
    }

    /// Path of the default settings file, if the config dir is known
    pub fn default_settings_path() -> Option<PathBuf> {
        config::config_path(SETTINGS_FILE)
    }

    /// Save these settings as the default settings file
    pub fn save(&self) -> Result<PathBuf> {
        config::save_json(SETTINGS_FILE, &self.to_settings_file())
    }

    /// Settings in their on-disk form
    pub fn to_settings_file(&self) -> SettingsFile {
        let remote = self.remote.as_ref();
        SettingsFile {
            max_retries: Some(self.engine.max_retries),
            grace_delay_ms: Some(duration_millis(self.engine.grace_delay)),
            dispatch_timeout_ms: Some(
                self.engine
                    .dispatch_timeout
                    .map_or(0, duration_millis),
            ),
            storage_key: Some(self.engine.storage_key.clone()),
            remote_url: remote.map(|r| r.base_url.clone()),
            auth_token: remote.and_then(|r| r.auth_token.clone()),
            request_timeout_ms: remote.map(|r| duration_millis(r.request_timeout)),
        }
    }

    fn apply_file(&mut self, file: SettingsFile) {
        if let Some(max_retries) = file.max_retries {
            self.engine.max_retries = max_retries;
        }
        if let Some(ms) = file.grace_delay_ms {
            self.engine.grace_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.dispatch_timeout_ms {
            self.engine.dispatch_timeout = timeout_from_millis(ms);
        }
        if let Some(key) = file.storage_key {
            self.engine.storage_key = key;
        }
        if let Some(url) = file.remote_url {
            let remote = self.remote.get_or_insert_with(|| RemoteConfig::new(""));
            remote.base_url = url;
        }
        if let Some(remote) = self.remote.as_mut() {
            if file.auth_token.is_some() {
                remote.auth_token = file.auth_token;
            }
            if let Some(ms) = file.request_timeout_ms {
                remote.request_timeout = Duration::from_millis(ms);
            }
        }
    }

    /// Apply `OUTBOX_*` overrides read through `var`
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = var("OUTBOX_MAX_RETRIES") {
            self.engine.max_retries = parse_env("OUTBOX_MAX_RETRIES", &value)?;
        }
        if let Some(value) = var("OUTBOX_GRACE_DELAY_MS") {
            let ms: u64 = parse_env("OUTBOX_GRACE_DELAY_MS", &value)?;
            self.engine.grace_delay = Duration::from_millis(ms);
        }
        if let Some(value) = var("OUTBOX_DISPATCH_TIMEOUT_MS") {
            let ms: u64 = parse_env("OUTBOX_DISPATCH_TIMEOUT_MS", &value)?;
            self.engine.dispatch_timeout = timeout_from_millis(ms);
        }
        if let Some(url) = var("OUTBOX_REMOTE_URL") {
            let remote = self.remote.get_or_insert_with(|| RemoteConfig::new(""));
            remote.base_url = url;
        }
        if let Some(token) = var("OUTBOX_AUTH_TOKEN") {
            if let Some(remote) = self.remote.as_mut() {
                remote.auth_token = Some(token);
            }
        }
        Ok(())
    }
}

/// Whole milliseconds, clamped to `u64`
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn timeout_from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{name} has an invalid value: {value:?}"))
}
