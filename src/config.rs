use crate::errors::ConfigError;
use crate::models::event::SourceType;
use crate::tasks::dispatcher::DispatcherConfig;
use crate::tasks::feed_poller::SourceConfig;
use crate::telegram::TelegramConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub feeder: FeederConfig,
    pub telegram: TelegramSection,
    pub dispatcher: DispatcherSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// empty means stdout
    pub log_file: String,
    pub log_level: String,
    /// "pretty" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_file: String::new(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeederConfig {
    /// seconds between polls of each source
    pub polling_interval: u64,
    pub fetch_blogposts: bool,
    pub fetch_reddit: bool,
    pub blog_url: String,
    pub reddit_url: String,
    pub reddit_user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_seen_ids: Option<usize>,
    pub state_file: PathBuf,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            polling_interval: 30,
            fetch_blogposts: true,
            fetch_reddit: true,
            blog_url: "http://blog.dota2.com/feed/".to_string(),
            reddit_url: "https://www.reddit.com/user/SirBelvedere/.rss".to_string(),
            reddit_user: "SirBelvedere".to_string(),
            fetch_timeout_secs: None,
            max_seen_ids: None,
            state_file: PathBuf::from("feeder_state.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelegramSection {
    pub token: String,
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base_url: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatcherSection {
    pub rate_limit_ms: u64,
    pub backlog_limit: usize,
    pub reconnect_cooldown_secs: u64,
    pub state_file: PathBuf,
}

impl Default for DispatcherSection {
    fn default() -> Self {
        Self {
            rate_limit_ms: 100,
            backlog_limit: 4,
            reconnect_cooldown_secs: 60,
            state_file: PathBuf::from("bot_state.json"),
        }
    }
}

impl AppConfig {
    /// Sources enabled by the feeder section, blog first.
    pub fn sources(&self) -> Vec<SourceConfig> {
        let interval = Duration::from_secs(self.feeder.polling_interval);
        let mut sources = Vec::new();
        if self.feeder.fetch_blogposts {
            sources.push(SourceConfig {
                kind: SourceType::Blogpost,
                url: self.feeder.blog_url.clone(),
                interval,
                profile_user: None,
            });
        }
        if self.feeder.fetch_reddit {
            sources.push(SourceConfig {
                kind: SourceType::RedditDigest,
                url: self.feeder.reddit_url.clone(),
                interval,
                profile_user: Some(self.feeder.reddit_user.clone()),
            });
        }
        sources
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.feeder.fetch_timeout_secs.map(Duration::from_secs)
    }

    pub fn telegram(&self) -> TelegramConfig {
        TelegramConfig {
            bot_token: self.telegram.token.clone(),
            api_base_url: self.telegram.api_base_url.trim_end_matches('/').to_string(),
            poll_timeout_secs: self.telegram.poll_timeout_secs,
            request_timeout_secs: self.telegram.request_timeout_secs,
        }
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            rate_limit: Duration::from_millis(self.dispatcher.rate_limit_ms),
            backlog_limit: self.dispatcher.backlog_limit,
        }
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_secs(self.dispatcher.reconnect_cooldown_secs)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `FR_*` overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("FR_TELEGRAM_TOKEN") {
            log::info!("Using Telegram token from FR_TELEGRAM_TOKEN");
            self.telegram.token = token;
        }
        if let Some(level) = lookup("FR_LOG_LEVEL") {
            log::info!("Using log level from FR_LOG_LEVEL: {}", level);
            self.general.log_level = level;
        }
        if let Some(format) = lookup("FR_LOG_FORMAT") {
            log::info!("Using log format from FR_LOG_FORMAT: {}", format);
            self.general.log_format = format;
        }
        if let Some(interval) = lookup("FR_POLLING_INTERVAL") {
            log::info!("Using polling interval from FR_POLLING_INTERVAL: {}", interval);
            self.feeder.polling_interval = interval
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("FR_POLLING_INTERVAL", "not a number"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feeder.polling_interval == 0 {
            return Err(ConfigError::invalid(
                "feeder.polling_interval",
                "must be at least 1 second",
            ));
        }
        if self.feeder.fetch_blogposts {
            validate_url("feeder.blog_url", &self.feeder.blog_url)?;
        }
        if self.feeder.fetch_reddit {
            validate_url("feeder.reddit_url", &self.feeder.reddit_url)?;
            if self.feeder.reddit_user.trim().is_empty() {
                return Err(ConfigError::invalid("feeder.reddit_user", "must not be empty"));
            }
        }
        if self.feeder.max_seen_ids == Some(0) {
            return Err(ConfigError::invalid("feeder.max_seen_ids", "must be positive"));
        }
        validate_url("telegram.api_base_url", &self.telegram.api_base_url)?;
        if self.telegram.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "telegram.request_timeout_secs",
                "must be at least 1 second",
            ));
        }
        if self.dispatcher.backlog_limit == 0 {
            return Err(ConfigError::invalid(
                "dispatcher.backlog_limit",
                "must be positive",
            ));
        }
        match self.general.log_format.as_str() {
            "pretty" | "json" => {}
            _ => {
                return Err(ConfigError::invalid(
                    "general.log_format",
                    "expected \"pretty\" or \"json\"",
                ))
            }
        }
        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::invalid(field, &e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::invalid(
            field,
            &format!("unsupported scheme '{other}'"),
        )),
    }
}

/// Read the config at `path`, writing the defaults there first if it doesn't
/// exist, then apply environment overrides and validate.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let mut config = read_or_create(path)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn read_or_create(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        log::info!("No config at {}, writing defaults", path.display());
        let config = AppConfig::default();
        std::fs::write(path, config.to_toml()?).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
