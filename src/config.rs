use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_newsletter_path")]
    pub newsletter_path: String,

    pub anthropic_api_key: Option<String>,
    pub omnivore_api_key: Option<String>,
    #[serde(default = "default_omnivore_label")]
    pub omnivore_label: String,
    pub slack_bot_token: Option<String>,
    pub slack_signing_secret: Option<String>,

    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
    /// Reverse proxies whose `X-Forwarded-For` header is believed.
    #[serde(default)]
    pub trusted_proxies: Vec<IpAddr>,

    #[serde(default = "default_minimum_item_count")]
    pub minimum_item_count: usize,
    #[serde(default = "default_maximum_item_count")]
    pub maximum_item_count: usize,
    #[serde(default = "default_days_to_check")]
    pub days_to_check: i64,
    #[serde(default = "default_maximum_days_to_check")]
    pub maximum_days_to_check: i64,

    #[serde(default = "default_long_article_count")]
    pub long_article_count: usize,
    #[serde(default = "default_short_article_count")]
    pub short_article_count: usize,

    #[serde(default = "default_recency_boost")]
    pub recency_boost: f64,
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: f64,
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,

    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Reactions that trigger a save. `None` means any reaction does.
    #[serde(default)]
    pub trigger_emojis: Option<Vec<String>>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bedtime-reading");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir().join("items.db").to_string_lossy().to_string()
}

fn default_newsletter_path() -> String {
    data_dir()
        .join("newsletter.html")
        .to_string_lossy()
        .to_string()
}

fn default_omnivore_label() -> String {
    "slack-import".to_string()
}

fn default_rate_limit() -> u32 {
    20
}

fn default_minimum_item_count() -> usize {
    10
}

fn default_maximum_item_count() -> usize {
    50
}

fn default_days_to_check() -> i64 {
    14
}

fn default_maximum_days_to_check() -> i64 {
    56
}

fn default_long_article_count() -> usize {
    3
}

fn default_short_article_count() -> usize {
    4
}

fn default_recency_boost() -> f64 {
    1000.0
}

fn default_recent_window_days() -> f64 {
    7.0
}

fn default_stale_after_days() -> i64 {
    7
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["localhost".to_string(), "127.0.0.1".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            newsletter_path: default_newsletter_path(),
            anthropic_api_key: None,
            omnivore_api_key: None,
            omnivore_label: default_omnivore_label(),
            slack_bot_token: None,
            slack_signing_secret: None,
            rate_limit_per_minute: default_rate_limit(),
            trusted_proxies: Vec::new(),
            minimum_item_count: default_minimum_item_count(),
            maximum_item_count: default_maximum_item_count(),
            days_to_check: default_days_to_check(),
            maximum_days_to_check: default_maximum_days_to_check(),
            long_article_count: default_long_article_count(),
            short_article_count: default_short_article_count(),
            recency_boost: default_recency_boost(),
            recent_window_days: default_recent_window_days(),
            stale_after_days: default_stale_after_days(),
            allowed_hosts: default_allowed_hosts(),
            log_level: default_log_level(),
            trigger_emojis: None,
        }
    }
}

impl Config {
    /// Reads the config file (creating it with defaults on first run) and
    /// then applies environment overrides, including any from `.env`.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        dotenvy::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bedtime-reading")
            .join("config.toml")
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HOST") {
            self.host = v;
        }
        if let Some(v) = lookup("PORT") {
            self.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = lookup("DB_PATH") {
            self.db_path = v;
        }
        if let Some(v) = lookup("NEWSLETTER_PATH") {
            self.newsletter_path = v;
        }
        if let Some(v) = lookup("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(v);
        }
        if let Some(v) = lookup("OMNIVORE_API_KEY") {
            self.omnivore_api_key = Some(v);
        }
        if let Some(v) = lookup("OMNIVORE_LABEL") {
            self.omnivore_label = v;
        }
        if let Some(v) = lookup("SLACK_BOT_TOKEN") {
            self.slack_bot_token = Some(v);
        }
        if let Some(v) = lookup("SLACK_SIGNING_SECRET") {
            self.slack_signing_secret = Some(v);
        }
        if let Some(v) = lookup("RATE_LIMIT_PER_MINUTE") {
            self.rate_limit_per_minute = parse_env("RATE_LIMIT_PER_MINUTE", &v)?;
        }
        if let Some(v) = lookup("TRUSTED_PROXIES") {
            self.trusted_proxies = split_list(&v)
                .iter()
                .map(|ip| parse_env("TRUSTED_PROXIES", ip))
                .collect::<Result<_>>()?;
        }
        if let Some(v) = lookup("MINIMUM_ITEM_COUNT") {
            self.minimum_item_count = parse_env("MINIMUM_ITEM_COUNT", &v)?;
        }
        if let Some(v) = lookup("MAXIMUM_ITEM_COUNT") {
            self.maximum_item_count = parse_env("MAXIMUM_ITEM_COUNT", &v)?;
        }
        if let Some(v) = lookup("DAYS_TO_CHECK") {
            self.days_to_check = parse_env("DAYS_TO_CHECK", &v)?;
        }
        if let Some(v) = lookup("MAXIMUM_DAYS_TO_CHECK") {
            self.maximum_days_to_check = parse_env("MAXIMUM_DAYS_TO_CHECK", &v)?;
        }
        if let Some(v) = lookup("NUMBER_OF_LONG_ARTICLES") {
            self.long_article_count = parse_env("NUMBER_OF_LONG_ARTICLES", &v)?;
        }
        if let Some(v) = lookup("NUMBER_OF_SHORT_ARTICLES") {
            self.short_article_count = parse_env("NUMBER_OF_SHORT_ARTICLES", &v)?;
        }
        if let Some(v) = lookup("RECENCY_BOOST") {
            self.recency_boost = parse_env("RECENCY_BOOST", &v)?;
        }
        if let Some(v) = lookup("RECENT_WINDOW_DAYS") {
            self.recent_window_days = parse_env("RECENT_WINDOW_DAYS", &v)?;
        }
        if let Some(v) = lookup("STALE_AFTER_DAYS") {
            self.stale_after_days = parse_env("STALE_AFTER_DAYS", &v)?;
        }
        if let Some(v) = lookup("ALLOWED_HOSTS") {
            self.allowed_hosts = split_list(&v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v.to_lowercase();
        }
        if let Some(v) = lookup("TRIGGER_EMOJIS") {
            let emojis = split_list(&v);
            self.trigger_emojis = (!emojis.is_empty()).then_some(emojis);
        }
        Ok(())
    }

    pub fn tier_counts(&self) -> (usize, usize) {
        (self.long_article_count, self.short_article_count)
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{key} has an invalid value: {value:?}")))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn env_overrides_file_values() {
        let vars = env(&[
            ("PORT", "9000"),
            ("NUMBER_OF_LONG_ARTICLES", "5"),
            ("ALLOWED_HOSTS", "reading.example.com, localhost ,"),
            ("TRIGGER_EMOJIS", "bookmark,eyes"),
            ("LOG_LEVEL", "DEBUG"),
        ]);
        let mut config = Config::default();
        assert_ok!(config.apply_env(|k| vars.get(k).cloned()));

        assert_eq!(config.port, 9000);
        assert_eq!(config.tier_counts(), (5, 4));
        assert_eq!(config.allowed_hosts, vec!["reading.example.com", "localhost"]);
        assert_eq!(
            config.trigger_emojis,
            Some(vec!["bookmark".to_string(), "eyes".to_string()])
        );
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn empty_trigger_list_means_any_reaction() {
        let vars = env(&[("TRIGGER_EMOJIS", " , ")]);
        let mut config = Config::default();
        assert_ok!(config.apply_env(|k| vars.get(k).cloned()));
        assert_eq!(config.trigger_emojis, None);
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let vars = env(&[("RATE_LIMIT_PER_MINUTE", "lots")]);
        let mut config = Config::default();
        let err = assert_err!(config.apply_env(|k| vars.get(k).cloned()));
        assert!(err.to_string().contains("RATE_LIMIT_PER_MINUTE"));
    }

    #[test]
    fn trusted_proxies_from_env() {
        let vars = env(&[("TRUSTED_PROXIES", "10.0.0.1, ::1")]);
        let mut config = Config::default();
        assert_ok!(config.apply_env(|k| vars.get(k).cloned()));
        assert_eq!(
            config.trusted_proxies,
            vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]
        );

        let vars = env(&[("TRUSTED_PROXIES", "proxy.internal")]);
        assert_err!(config.apply_env(|k| vars.get(k).cloned()));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str("port = 8123\nminimum_item_count = 3\n").unwrap();
        assert_eq!(config.port, 8123);
        assert_eq!(config.minimum_item_count, 3);
        assert_eq!(config.maximum_item_count, 50);
        assert_eq!(config.recency_boost, 1000.0);
        assert!(config.trusted_proxies.is_empty());
    }
}
