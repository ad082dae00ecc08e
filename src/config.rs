//! Configuration loader and validator for the Twitter→Telegram forwarder.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::forwarder::DeliveryErrorKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub twitter: Twitter,
    pub telegram: Telegram,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Twitter API credentials and request tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Twitter {
    pub consumer_key: String,
    pub consumer_secret: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_initial_sample_size")]
    pub initial_sample_size: u32,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
    /// Delivery failures that make a chat eligible for removal.
    #[serde(default = "default_fatal_errors")]
    pub fatal_errors: Vec<DeliveryErrorKind>,
    #[serde(default)]
    pub show_timestamp: bool,
}

fn default_poll_interval_secs() -> u64 {
    180
}

fn default_api_base() -> String {
    "https://api.twitter.com/".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_initial_sample_size() -> u32 {
    crate::fetcher::INITIAL_SAMPLE_SIZE
}

fn default_fatal_errors() -> Vec<DeliveryErrorKind> {
    vec![DeliveryErrorKind::Unauthorized, DeliveryErrorKind::ChatMigrated]
}

impl App {
    /// Expand a leading `~/` in `data_dir`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// Default SQLite location inside the data directory, unless `DATABASE_URL` is set.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!("sqlite://{}/forwarder.db", self.app.resolved_data_dir())
        })
    }

    /// Replace secrets with values from the environment when present.
    pub fn apply_env_overrides(&mut self) {
        let lookup = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        if let Some(v) = lookup("TWITTER_CONSUMER_KEY") {
            self.twitter.consumer_key = v;
        }
        if let Some(v) = lookup("TWITTER_CONSUMER_SECRET") {
            self.twitter.consumer_secret = v;
        }
        if let Some(v) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_secs must be > 0"));
    }

    if cfg.twitter.consumer_key.trim().is_empty() {
        return Err(ConfigError::Invalid("twitter.consumer_key must be non-empty"));
    }
    if cfg.twitter.consumer_secret.trim().is_empty() {
        return Err(ConfigError::Invalid("twitter.consumer_secret must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.twitter.api_base).is_err() {
        return Err(ConfigError::Invalid("twitter.api_base must be a valid URL"));
    }
    if cfg.twitter.timeout_secs == 0 {
        return Err(ConfigError::Invalid("twitter.timeout_secs must be > 0"));
    }
    if cfg.twitter.initial_sample_size == 0 {
        return Err(ConfigError::Invalid("twitter.initial_sample_size must be > 0"));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }

    Ok(())
}

/// Returns a complete example YAML document.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_secs: 180

twitter:
  consumer_key: "YOUR_TWITTER_CONSUMER_KEY"
  consumer_secret: "YOUR_TWITTER_CONSUMER_SECRET"
  api_base: "https://api.twitter.com/"
  timeout_secs: 30
  initial_sample_size: 5

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  fatal_errors:
    - unauthorized
    - chat_migrated
  show_timestamp: false
"#
}
