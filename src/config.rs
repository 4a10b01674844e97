use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Runtime settings, read from `QUOTES_*` environment variables over built-in defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub source_url: String,
    pub bind: String,
    pub workers: usize,
    pub schedule_minutes: u64,
    pub fetch_timeout_secs: u64,
    pub scraped_retention_secs: i64,
    pub scheduler_enabled: bool,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("db_path", "data/quotes.sqlite")?
            .set_default("source_url", "https://quotes.toscrape.com/")?
            .set_default("bind", "127.0.0.1:8080")?
            .set_default("workers", 2)?
            .set_default("schedule_minutes", 120)?
            .set_default("fetch_timeout_secs", 10)?
            .set_default("scraped_retention_secs", 86_400)?
            .set_default("scheduler_enabled", true)?
            .add_source(Environment::with_prefix("QUOTES").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn schedule_period(&self) -> Duration {
        Duration::from_secs(self.schedule_minutes.max(1) * 60)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.scraped_retention_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_environment() {
        let settings = Settings::load().unwrap();
        if std::env::var("QUOTES_SCHEDULE_MINUTES").is_err() {
            assert_eq!(settings.schedule_period(), Duration::from_secs(120 * 60));
        }
        if std::env::var("QUOTES_SCRAPED_RETENTION_SECS").is_err() {
            assert_eq!(settings.retention(), chrono::Duration::days(1));
        }
        assert!(settings.source_url.starts_with("http"));
    }
}
