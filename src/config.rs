use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default = "default_storage_config")]
    pub storage: StorageConfig,
}

/// The admin bot: receives commands and delivers alerts
#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default)]
    pub admin_ids: Vec<i64>,
}

/// The monitoring identity that reads the groups
#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_join_delay_secs")]
    pub join_delay_secs: u64,
    #[serde(default = "default_protocol_backoff_secs")]
    pub protocol_backoff_secs: u64,
    #[serde(default = "default_unexpected_backoff_secs")]
    pub unexpected_backoff_secs: u64,
    /// Host used in message permalinks
    #[serde(default = "default_link_domain")]
    pub link_domain: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            join_delay_secs: default_join_delay_secs(),
            protocol_backoff_secs: default_protocol_backoff_secs(),
            unexpected_backoff_secs: default_unexpected_backoff_secs(),
            link_domain: default_link_domain(),
        }
    }
}

impl MonitorConfig {
    pub fn join_delay(&self) -> Duration {
        Duration::from_secs(self.join_delay_secs)
    }

    pub fn protocol_backoff(&self) -> Duration {
        Duration::from_secs(self.protocol_backoff_secs)
    }

    pub fn unexpected_backoff(&self) -> Duration {
        Duration::from_secs(self.unexpected_backoff_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

fn default_join_delay_secs() -> u64 {
    5
}

fn default_protocol_backoff_secs() -> u64 {
    5
}

fn default_unexpected_backoff_secs() -> u64 {
    10
}

fn default_link_domain() -> String {
    "t.me".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("groupwatch.db")
}

fn default_storage_config() -> StorageConfig {
    StorageConfig {
        database_path: default_db_path(),
    }
}

/// Parse a comma-separated list of account ids, e.g. `"123, 456"`.
pub fn parse_admin_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("Invalid admin id: {:?}", s))
        })
        .collect()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Environment values win over the file; `ADMIN_IDS` is merged in.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(token) = lookup("WATCHER_BOT_TOKEN") {
            self.watcher.bot_token = token;
        }
        if let Some(raw) = lookup("ADMIN_IDS") {
            for id in parse_admin_ids(&raw)? {
                if !self.telegram.admin_ids.contains(&id) {
                    self.telegram.admin_ids.push(id);
                }
            }
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }

        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("telegram.bot_token is empty");
        }
        if self.watcher.bot_token.trim().is_empty() {
            anyhow::bail!("watcher.bot_token is empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
        [telegram]
        bot_token = "admin-token"
        admin_ids = [1]

        [watcher]
        bot_token = "watcher-token"
    "#;

    #[test]
    fn test_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.monitor.join_delay(), Duration::from_secs(5));
        assert_eq!(config.monitor.protocol_backoff(), Duration::from_secs(5));
        assert_eq!(config.monitor.unexpected_backoff(), Duration::from_secs(10));
        assert_eq!(config.monitor.link_domain, "t.me");
        assert_eq!(config.storage.database_path, PathBuf::from("groupwatch.db"));
    }

    #[test]
    fn test_monitor_overrides() {
        let content = format!("{}\n[monitor]\njoin_delay_secs = 2\n", MINIMAL);
        let config = Config::parse(&content).unwrap();
        assert_eq!(config.monitor.join_delay_secs, 2);
        assert_eq!(config.monitor.unexpected_backoff_secs, 10);
    }

    #[test]
    fn test_env_overrides_and_merges_admins() {
        let env: HashMap<&str, &str> = [
            ("WATCHER_BOT_TOKEN", "from-env"),
            ("ADMIN_IDS", "1, 2,3"),
            ("DATABASE_PATH", "/tmp/gw.db"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::parse(MINIMAL).unwrap();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.telegram.bot_token, "admin-token");
        assert_eq!(config.watcher.bot_token, "from-env");
        assert_eq!(config.telegram.admin_ids, vec![1, 2, 3]);
        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/gw.db"));
    }

    #[test]
    fn test_empty_token_rejected() {
        let mut config = Config::parse(MINIMAL).unwrap();
        let result = config.apply_env(|k| (k == "TELEGRAM_BOT_TOKEN").then(|| " ".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_admin_ids() {
        assert_eq!(parse_admin_ids("").unwrap(), Vec::<i64>::new());
        assert_eq!(parse_admin_ids("10,20").unwrap(), vec![10, 20]);
        assert!(parse_admin_ids("10,abc").is_err());
    }
}
