use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{Cache, Cached};
use crate::error::Result;
use crate::parser::parse_feed;
use crate::tweets::Tweeter;
use crate::version::user_agent;

/// Max parallel HTTP fetches
pub const DEFAULT_MAX_FETCHERS: usize = 50;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub max_fetchers: usize,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            max_fetchers: DEFAULT_MAX_FETCHERS,
            timeout: DEFAULT_TIMEOUT,
            user_agent: user_agent(),
        }
    }
}

/// How each source ended up after one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Full body received, parsed and stored
    pub updated: usize,
    /// Server answered 304, cached tweets kept
    pub not_modified: usize,
    /// Any other status, entry left as it was
    pub unchanged: usize,
    /// Transport error, timeout or unreadable body
    pub failed: usize,
}

impl RefreshSummary {
    pub fn total(&self) -> usize {
        self.updated + self.not_modified + self.unchanged + self.failed
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Updated => self.updated += 1,
            Outcome::NotModified => self.not_modified += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Updated,
    NotModified,
    Unchanged,
    Failed,
}

pub struct Fetcher {
    client: Client,
    cache: Arc<Cache>,
    fetchers: Arc<Semaphore>,
    /// Held for the length of a pass; later passes queue behind it.
    pass: Mutex<()>,
    /// Configured URL -> URL it last redirected to
    redirects: Arc<RwLock<HashMap<String, String>>>,
}

impl Fetcher {
    pub fn new(cache: Arc<Cache>) -> Result<Self> {
        Self::with_options(cache, FetcherOptions::default())
    }

    pub fn with_options(cache: Arc<Cache>, options: FetcherOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent)
            .build()?;

        Ok(Self {
            client,
            cache,
            fetchers: Arc::new(Semaphore::new(options.max_fetchers.max(1))),
            pass: Mutex::new(()),
            redirects: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn is_refreshing(&self) -> bool {
        self.pass.try_lock().is_err()
    }

    /// Bring the cache up to date for every `nick -> url` source.
    ///
    /// Returns once every fetch has finished. Individual failures are logged
    /// and leave that source's entry as it was. A call made while another
    /// pass is running waits for it, then runs its own sources.
    pub async fn refresh(&self, sources: &HashMap<String, String>) -> RefreshSummary {
        let _pass = match self.pass.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Refresh already in progress, waiting");
                self.pass.lock().await
            }
        };

        self.do_refresh(sources).await
    }

    async fn do_refresh(&self, sources: &HashMap<String, String>) -> RefreshSummary {
        info!("Refreshing {} feeds", sources.len());

        let mut summary = RefreshSummary::default();
        let mut tasks = JoinSet::new();

        for (nick, url) in sources {
            // Held by the task and released when it finishes, panics included.
            let permit = match self.fetchers.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("fetcher pool closed: {}", e);
                    summary.record(Outcome::Failed);
                    continue;
                }
            };

            let client = self.client.clone();
            let cache = self.cache.clone();
            let redirects = self.redirects.clone();
            let nick = nick.clone();
            let url = url.clone();
            tasks.spawn(async move {
                let outcome = fetch_feed(&client, &cache, &redirects, nick, url).await;
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!("feed fetch task failed: {}", e);
                    summary.record(Outcome::Failed);
                }
            }
        }

        info!(
            "Feed refresh complete: {} updated, {} not modified, {} unchanged, {} failed",
            summary.updated, summary.not_modified, summary.unchanged, summary.failed
        );
        summary
    }
}

async fn fetch_feed(
    client: &Client,
    cache: &Cache,
    redirects: &RwLock<HashMap<String, String>>,
    nick: String,
    url: String,
) -> Outcome {
    // A redirected feed is cached under the URL it resolved to.
    let key = redirects
        .read()
        .await
        .get(&url)
        .cloned()
        .unwrap_or_else(|| url.clone());

    let mut request = client.get(&url);
    if let Some(last_modified) = cache.last_modified(&key).await {
        request = request.header(IF_MODIFIED_SINCE, last_modified);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            error!("{}: request failed: {}", url, e);
            return Outcome::Failed;
        }
    };

    let url = match redirected_to(&url, response.url()) {
        Some(actual) => {
            warn!("feed for {} changed from {} to {}", nick, url, actual);
            redirects.write().await.insert(url, actual.clone());
            actual
        }
        None => {
            redirects.write().await.remove(&url);
            url
        }
    };

    match response.status() {
        StatusCode::OK => {
            let last_modified = response
                .headers()
                .get(LAST_MODIFIED)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();

            let body = match response.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    error!("{}: error reading body: {}", url, e);
                    return Outcome::Failed;
                }
            };

            let tweeter = Tweeter {
                nick,
                url: url.clone(),
            };
            let text = String::from_utf8_lossy(&body);
            let tweets = match parse_feed(text.as_bytes(), &tweeter) {
                Ok(tweets) => tweets,
                Err(e) => {
                    error!("{}: error parsing feed: {}", url, e);
                    return Outcome::Failed;
                }
            };

            debug!("Fetched {} tweets for '{}' ({})", tweets.len(), tweeter.nick, url);
            cache
                .insert(
                    url,
                    Cached {
                        tweets,
                        last_modified,
                    },
                )
                .await;
            Outcome::Updated
        }
        StatusCode::NOT_MODIFIED => {
            debug!("{}: not modified", url);
            Outcome::NotModified
        }
        status => {
            warn!("{}: unexpected status {}, keeping cached feed", url, status);
            Outcome::Unchanged
        }
    }
}

/// The URL a response actually came from, if it differs from `requested`.
fn redirected_to(requested: &str, actual: &Url) -> Option<String> {
    match Url::parse(requested) {
        Ok(requested) if requested == *actual => None,
        _ => Some(actual.to_string()),
    }
}

/// Refresh on a fixed interval and store the cache after every pass.
///
/// The first pass runs immediately unless the snapshot in `data_dir` is
/// younger than the interval.
pub async fn start_background_refresh(
    fetcher: Arc<Fetcher>,
    sources: HashMap<String, String>,
    data_dir: PathBuf,
    interval_minutes: u64,
) {
    let interval = Duration::from_secs(interval_minutes * 60);

    let due = match Cache::last_modified_time(&data_dir).await {
        Ok(modified) => Utc::now()
            .signed_duration_since(modified)
            .to_std()
            .map_or(true, |age| age >= interval),
        Err(e) => {
            error!("error checking cache age: {}", e);
            true
        }
    };

    if due {
        info!("Starting initial feed fetch");
        refresh_and_store(&fetcher, &sources, &data_dir).await;
    } else {
        info!("Cache is fresh, skipping initial feed fetch");
    }

    // Then schedule periodic refreshes
    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled feed refresh");
        refresh_and_store(&fetcher, &sources, &data_dir).await;
    }
}

async fn refresh_and_store(
    fetcher: &Fetcher,
    sources: &HashMap<String, String>,
    data_dir: &Path,
) {
    fetcher.refresh(sources).await;
    if let Err(e) = fetcher.cache().store(data_dir).await {
        error!("Failed to store cache: {}", e);
    }
}
