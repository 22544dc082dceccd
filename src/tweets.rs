use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::error;
use url::Url;

/// The feed a tweet came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tweeter {
    pub nick: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    pub tweeter: Tweeter,
    pub text: String,
    pub created: DateTime<Utc>,
}

/// An ordered collection of tweets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tweets(Vec<Tweet>);

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#[-\w]+").expect("valid tag regex"))
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([_a-zA-Z0-9]+)").expect("valid mention regex"))
}

impl Tweets {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tweet> {
        self.0.iter()
    }

    pub fn push(&mut self, tweet: Tweet) {
        self.0.push(tweet);
    }

    pub fn into_vec(self) -> Vec<Tweet> {
        self.0
    }

    /// Stable sort, oldest first. Reverse for a newest-first timeline.
    pub fn sort_chronological(&mut self) {
        self.0.sort_by_key(|tweet| tweet.created);
    }

    pub fn reverse(&mut self) {
        self.0.reverse();
    }

    /// Count hashtags across every tweet. Keys are the tag without `#`.
    pub fn tags(&self) -> HashMap<String, usize> {
        let mut tags = HashMap::new();
        for tweet in &self.0 {
            for tag in tag_re().find_iter(&tweet.text) {
                *tags
                    .entry(tag.as_str().trim_start_matches('#').to_string())
                    .or_insert(0) += 1;
            }
        }
        tags
    }
}

impl From<Vec<Tweet>> for Tweets {
    fn from(tweets: Vec<Tweet>) -> Self {
        Self(tweets)
    }
}

impl FromIterator<Tweet> for Tweets {
    fn from_iter<I: IntoIterator<Item = Tweet>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Tweet> for Tweets {
    fn extend<I: IntoIterator<Item = Tweet>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Tweets {
    type Item = Tweet;
    type IntoIter = std::vec::IntoIter<Tweet>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Tweets {
    type Item = &'a Tweet;
    type IntoIter = std::slice::Iter<'a, Tweet>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Tweets {
    type Output = Tweet;

    fn index(&self, index: usize) -> &Tweet {
        &self.0[index]
    }
}

/// Turns `@nick` into `@<nick URL>` when `nick` is in `follows`.
///
/// Mentions of nicks that aren't followed are left as written.
pub fn expand_mentions(text: &str, follows: &HashMap<String, String>) -> String {
    mention_re()
        .replace_all(text, |caps: &Captures| match follows.get(&caps[1]) {
            Some(url) => format!("@<{} {}>", &caps[1], url),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Normalize a feed URL so the same feed is always keyed the same way.
///
/// `https` is folded to `http`, user info and a trailing `/` are dropped.
/// Returns `None` for empty or unparseable input.
pub fn normalize_url(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    let mut url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => {
            error!("error parsing url {}: {}", raw, e);
            return None;
        }
    };

    // The parser already drops a default `:443`.
    if url.scheme() == "https" && url.set_scheme("http").is_err() {
        error!("error normalizing url {}", raw);
        return None;
    }
    // Only URLs without a host refuse user info changes.
    if url.set_username("").is_err() || url.set_password(None).is_err() {
        error!("error normalizing url {}: no host", raw);
        return None;
    }

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&path);

    let mut norm = url.to_string();
    // An empty path still renders as `/` after the host.
    if path.is_empty() && url.query().is_none() && url.fragment().is_none() {
        norm = norm.trim_end_matches('/').to_string();
    }
    Some(norm)
}
