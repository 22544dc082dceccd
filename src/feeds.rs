//! Feeds hosted by this instance, one file per nick under `<data>/feeds/`.

use std::collections::HashMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{error, warn};

use crate::error::{CacheError, Result};
use crate::parser::parse_feed;
use crate::tweets::{expand_mentions, Tweeter, Tweets};

pub const FEEDS_DIR: &str = "feeds";

pub fn feed_path<P: AsRef<Path>>(data_dir: P, nick: &str) -> PathBuf {
    data_dir.as_ref().join(FEEDS_DIR).join(nick)
}

/// Public URL of a local feed.
pub fn feed_url(base_url: &str, nick: &str) -> String {
    format!("{}/u/{}", base_url.trim_end_matches('/'), nick)
}

/// Append a tweet to `nick`'s feed, expanding mentions of followed nicks.
pub async fn append_tweet<P: AsRef<Path>>(
    data_dir: P,
    nick: &str,
    text: &str,
    follows: &HashMap<String, String>,
) -> Result<()> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CacheError::EmptyPost);
    }

    let path = feed_path(&data_dir, nick);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let line = format!(
        "{}\t{}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        expand_mentions(text, follows)
    );

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;

    Ok(())
}

/// Every tweet from every local feed.
///
/// A feed that can't be read is logged and skipped.
pub async fn local_tweets<P: AsRef<Path>>(data_dir: P, base_url: &str) -> Result<Tweets> {
    let dir = data_dir.as_ref().join(FEEDS_DIR);
    let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
        error!("error listing feeds in {}: {}", dir.display(), e);
        CacheError::Io(e)
    })?;

    let mut tweets = Tweets::new();
    while let Some(entry) = entries.next_entry().await? {
        let nick = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("error opening feed {}: {}", path.display(), e);
                continue;
            }
        };

        let tweeter = Tweeter {
            url: feed_url(base_url, &nick),
            nick,
        };
        match parse_feed(BufReader::new(&bytes[..]), &tweeter) {
            Ok(parsed) => tweets.extend(parsed),
            Err(e) => warn!("error reading feed {}: {}", path.display(), e),
        }
    }

    Ok(tweets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn follows() -> HashMap<String, String> {
        HashMap::from([("bob".to_string(), "http://b.example/tw.txt".to_string())])
    }

    #[test]
    fn test_feed_url_trims_slash() {
        assert_eq!(feed_url("http://example.com/", "alice"), "http://example.com/u/alice");
        assert_eq!(feed_url("http://example.com", "alice"), "http://example.com/u/alice");
    }

    #[tokio::test]
    async fn test_append_then_read_back() {
        let dir = TempDir::new().unwrap();

        append_tweet(dir.path(), "alice", "  hello @bob and @carol  ", &follows())
            .await
            .unwrap();
        append_tweet(dir.path(), "alice", "second #post", &follows())
            .await
            .unwrap();

        let content = std::fs::read_to_string(feed_path(dir.path(), "alice")).unwrap();
        assert_eq!(content.lines().count(), 2);

        let tweets = local_tweets(dir.path(), "http://example.com/").await.unwrap();
        assert_eq!(tweets.len(), 2);
        assert_eq!(tweets[0].text, "hello @<bob http://b.example/tw.txt> and @carol");
        assert_eq!(tweets[0].tweeter.nick, "alice");
        assert_eq!(tweets[0].tweeter.url, "http://example.com/u/alice");
        assert!(tweets[0].created > crate::time::epoch());
        assert_eq!(tweets.tags().get("post"), Some(&1));
    }

    #[tokio::test]
    async fn test_empty_post_rejected() {
        let dir = TempDir::new().unwrap();
        let result = append_tweet(dir.path(), "alice", "   ", &follows()).await;

        assert!(matches!(result, Err(CacheError::EmptyPost)));
        assert!(!feed_path(dir.path(), "alice").exists());
    }

    #[tokio::test]
    async fn test_local_tweets_across_feeds() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(FEEDS_DIR)).unwrap();
        std::fs::write(
            feed_path(dir.path(), "alice"),
            "2021-01-01T00:00:00Z\ta\n",
        )
        .unwrap();
        std::fs::write(
            feed_path(dir.path(), "bob"),
            "2021-01-02T00:00:00Z\tb\nbroken\n",
        )
        .unwrap();

        let mut tweets = local_tweets(dir.path(), "http://example.com").await.unwrap();
        tweets.sort_chronological();

        assert_eq!(tweets.len(), 2);
        assert_eq!(tweets[0].tweeter.nick, "alice");
        assert_eq!(tweets[1].tweeter.url, "http://example.com/u/bob");
    }

    #[tokio::test]
    async fn test_local_tweets_without_feeds_dir_fails() {
        let dir = TempDir::new().unwrap();
        assert!(local_tweets(dir.path(), "http://example.com").await.is_err());
    }
}
