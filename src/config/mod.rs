//! Configuration system (layered: defaults < TOML file < env).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ThreadRunError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Settings for the provider client and the orchestrator.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadRunConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub assistant_id: Option<String>,
    pub organization: Option<String>,
    /// Max wait for the next raw event; 0 disables the timeout.
    pub stream_idle_timeout_ms: u64,
    pub channel_capacity: usize,
    pub request_timeout_secs: u64,
}

impl Default for ThreadRunConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            assistant_id: None,
            organization: None,
            stream_idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for ThreadRunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadRunConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("assistant_id", &self.assistant_id)
            .field("organization", &self.organization)
            .field("stream_idle_timeout_ms", &self.stream_idle_timeout_ms)
            .field("channel_capacity", &self.channel_capacity)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// `<config dir>/threadrun/config.toml` for the current platform.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "threadrun")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

impl ThreadRunConfig {
    /// Read a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ThreadRunError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| {
            ThreadRunError::Configuration(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Defaults overridden by environment variables (`.env` honoured).
    pub fn from_env() -> Result<Self, ThreadRunError> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Full layering: defaults, then `path` (or the default file if it
    /// exists), then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ThreadRunError> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => {
                    tracing::debug!(path = %path.display(), "loading config file");
                    Self::from_file(path)?
                }
                None => Self::default(),
            },
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ThreadRunError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ThreadRunError> {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.base_url = url;
        }
        if let Some(org) = lookup("OPENAI_ORGANIZATION") {
            self.organization = Some(org);
        }
        if let Some(id) = lookup("ASSISTANT_ID") {
            self.assistant_id = Some(id);
        }
        if let Some(ms) = lookup("THREADRUN_IDLE_TIMEOUT_MS") {
            self.stream_idle_timeout_ms = parse_number("THREADRUN_IDLE_TIMEOUT_MS", &ms)?;
        }
        if let Some(cap) = lookup("THREADRUN_CHANNEL_CAPACITY") {
            self.channel_capacity = parse_number("THREADRUN_CHANNEL_CAPACITY", &cap)?;
        }
        Ok(())
    }

    /// Fail fast on settings every request needs.
    pub fn validate(&self) -> Result<(), ThreadRunError> {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ThreadRunError::Configuration(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }
        if self.assistant_id.as_deref().map_or(true, str::is_empty) {
            return Err(ThreadRunError::Configuration(
                "ASSISTANT_ID is not set".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ThreadRunError::Configuration(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.stream_idle_timeout_ms > 0).then(|| Duration::from_millis(self.stream_idle_timeout_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ThreadRunError> {
    raw.trim()
        .parse()
        .map_err(|_| ThreadRunError::Configuration(format!("{name} must be a number, got '{raw}'")))
}
