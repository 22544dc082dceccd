use std::io::BufRead;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::time::parse_time;
use crate::tweets::{Tweet, Tweeter, Tweets};

fn line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `.+?` is ungreedy: the timestamp is the first whitespace-free run.
    RE.get_or_init(|| Regex::new(r"^(.+?)(\s+)(.+)$").expect("valid line regex"))
}

/// Parse a twtxt feed into tweets attributed to `tweeter`.
///
/// Blank lines and `#` comments are skipped. Lines that are not
/// `<timestamp><whitespace><text>` are logged and skipped. Only a failure
/// to read from `reader` is an error.
pub fn parse_feed<R: BufRead>(reader: R, tweeter: &Tweeter) -> std::io::Result<Tweets> {
    let mut tweets = Tweets::new();

    for line in reader.lines() {
        let line = line?;
        if let Some(tweet) = parse_line(&line, tweeter) {
            tweets.push(tweet);
        }
    }

    Ok(tweets)
}

/// Parse a single feed line, `None` for comments, blanks and malformed lines.
pub fn parse_line(line: &str, tweeter: &Tweeter) -> Option<Tweet> {
    // Callers may hand over raw CRLF lines.
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let caps = match line_re().captures(line) {
        Some(caps) => caps,
        None => {
            warn!("could not parse: '{}' (source:{})", line, tweeter.url);
            return None;
        }
    };

    Some(Tweet {
        tweeter: tweeter.clone(),
        created: parse_time(&caps[1]),
        text: caps[3].to_string(),
    })
}
