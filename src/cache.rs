use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::error::{CacheError, Result};
use crate::time::epoch;
use crate::tweets::Tweets;

/// Snapshot file name inside the data directory
pub const CACHE_FILE: &str = "cache";

/// The last known content of one feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cached {
    pub tweets: Tweets,
    /// `Last-Modified` value from the response that produced `tweets`,
    /// empty if the server sent none
    pub last_modified: String,
}

/// Feed cache keyed by canonical feed URL.
///
/// Many fetches read and write the map concurrently; each access takes the
/// lock for that access only, and an entry is replaced as a whole.
#[derive(Debug, Default)]
pub struct Cache {
    entries: RwLock<HashMap<String, Cached>>,
}

impl From<HashMap<String, Cached>> for Cache {
    fn from(entries: HashMap<String, Cached>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the snapshot from `dir`. A missing snapshot is an empty cache.
    pub async fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(CACHE_FILE);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no cache snapshot at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => {
                error!("error loading cache {}: {}", path.display(), e);
                return Err(CacheError::Io(e));
            }
        };

        let entries: HashMap<String, Cached> = bincode::deserialize(&bytes).map_err(|e| {
            error!("error decoding cache {}: {}", path.display(), e);
            CacheError::Decode(e)
        })?;

        info!("Loaded cache with {} feeds", entries.len());
        Ok(Self::from(entries))
    }

    /// Write the whole cache to the snapshot file in `dir`.
    ///
    /// The snapshot is written next to the target and renamed over it, so a
    /// crash mid-write leaves the previous snapshot intact.
    pub async fn store<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let bytes = {
            let entries = self.entries.read().await;
            bincode::serialize(&*entries).map_err(|e| {
                error!("error encoding cache: {}", e);
                CacheError::Encode(e)
            })?
        };

        let path = dir.as_ref().join(CACHE_FILE);
        let tmp = path.with_extension("tmp");
        if let Err(e) = write_then_rename(&tmp, &path, &bytes).await {
            error!("error writing cache file {}: {}", path.display(), e);
            return Err(CacheError::Io(e));
        }

        debug!("Stored cache snapshot ({} bytes)", bytes.len());
        Ok(())
    }

    /// Modification time of the snapshot in `dir`, the Unix epoch if there
    /// is none yet.
    pub async fn last_modified_time<P: AsRef<Path>>(dir: P) -> Result<DateTime<Utc>> {
        let path = dir.as_ref().join(CACHE_FILE);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.modified()?.into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(epoch()),
            Err(e) => Err(CacheError::Io(e)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn get(&self, url: &str) -> Option<Cached> {
        self.entries.read().await.get(url).cloned()
    }

    /// Revalidation token for `url`, if one is cached and non-empty.
    pub async fn last_modified(&self, url: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .get(url)
            .map(|cached| cached.last_modified.clone())
            .filter(|token| !token.is_empty())
    }

    /// Install `cached` for `url`, replacing any previous entry.
    pub async fn insert(&self, url: String, cached: Cached) {
        self.entries.write().await.insert(url, cached);
    }

    /// Every cached tweet, in no particular order across feeds.
    pub async fn get_all(&self) -> Tweets {
        let entries = self.entries.read().await;
        let mut all = Tweets::new();
        for cached in entries.values() {
            all.extend(cached.tweets.iter().cloned());
        }
        all
    }

    /// Tweets cached for `url`, empty when the feed is unknown.
    pub async fn get_by_url(&self, url: &str) -> Tweets {
        self.entries
            .read()
            .await
            .get(url)
            .map(|cached| cached.tweets.clone())
            .unwrap_or_default()
    }

    /// Timeline for a set of followed feed URLs, newest first.
    pub async fn timeline<'a, I>(&self, urls: I) -> Tweets
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut tweets = Tweets::new();
        for url in urls {
            tweets.extend(self.get_by_url(url).await);
        }
        tweets.sort_chronological();
        tweets.reverse();
        tweets
    }

    /// Copy of the whole map.
    pub async fn entries(&self) -> HashMap<String, Cached> {
        self.entries.read().await.clone()
    }
}

async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(tmp, path).await
}
