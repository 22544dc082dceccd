use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::fetcher::{FetcherOptions, DEFAULT_MAX_FETCHERS};
use crate::tweets::normalize_url;
use crate::version::user_agent;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Directory holding the cache snapshot and local feeds
    #[serde(default = "default_data")]
    pub data: PathBuf,
    /// Base URL used to build local feed URLs, passed to
    /// `feeds::local_tweets` by whatever serves those feeds
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default = "default_max_fetchers")]
    pub max_fetchers: usize,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// nick -> feed URL
    #[serde(default)]
    pub following: HashMap<String, String>,
}

fn default_data() -> PathBuf {
    PathBuf::from("./data")
}

fn default_base_url() -> String {
    "http://0.0.0.0:8000".to_string()
}

fn default_refresh_interval() -> u64 {
    5
}

fn default_max_fetchers() -> usize {
    DEFAULT_MAX_FETCHERS
}

fn default_timeout_secs() -> u64 {
    15
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Followed feeds with normalized URLs. Invalid URLs are dropped.
    pub fn sources(&self) -> HashMap<String, String> {
        self.following
            .iter()
            .filter_map(|(nick, url)| match normalize_url(url) {
                Some(url) => Some((nick.clone(), url)),
                None => {
                    warn!("Ignoring feed for {} with invalid url '{}'", nick, url);
                    None
                }
            })
            .collect()
    }

    pub fn fetcher_options(&self) -> FetcherOptions {
        FetcherOptions {
            max_fetchers: self.max_fetchers,
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: user_agent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::from_str("").unwrap();

        assert_eq!(config.data, PathBuf::from("./data"));
        assert_eq!(config.base_url, "http://0.0.0.0:8000");
        assert_eq!(config.refresh_interval, 5);
        assert_eq!(config.max_fetchers, 50);
        assert_eq!(config.timeout_secs, 15);
        assert!(config.following.is_empty());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            data = "/var/lib/twtxt"
            base_url = "https://twtxt.example.com"
            refresh_interval = 30
            max_fetchers = 8
            timeout_secs = 3

            [following]
            alice = "https://a.example/twtxt.txt"
            bob = "http://b.example/tw.txt"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.data, PathBuf::from("/var/lib/twtxt"));
        assert_eq!(config.base_url, "https://twtxt.example.com");
        assert_eq!(config.refresh_interval, 30);
        assert_eq!(config.following.len(), 2);
        assert_eq!(config.following["bob"], "http://b.example/tw.txt");

        let options = config.fetcher_options();
        assert_eq!(options.max_fetchers, 8);
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert!(options.user_agent.starts_with("twtxt/"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let content = "this is not valid toml {{{";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_type_rejected() {
        let result = Config::from_str("refresh_interval = \"often\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_sources_normalized() {
        let content = r#"
            [following]
            alice = "https://a.example/twtxt.txt/"
            broken = "not a url"
            carol = ""
        "#;

        let config = Config::from_str(content).unwrap();
        let sources = config.sources();

        assert_eq!(sources.len(), 1);
        assert_eq!(sources["alice"], "http://a.example/twtxt.txt");
    }
}
