//! Feed discovery.
//!
//! Resolves channel references to feeds and filters their entries down to the
//! requested publication window. Unresolvable feeds and malformed entries are
//! skipped with a warning; discovery as a whole never fails.

mod youtube;

pub use youtube::{parse_atom_feed, YoutubeFeedResolver};

use crate::error::{DigestError, Result};
use crate::log::RunLogger;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::instrument;

/// A discovered video inside the requested window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoItem {
    /// Video ID. Unique within a feed.
    pub id: String,
    pub title: String,
    pub channel_name: String,
    /// Publication time, normalized to UTC.
    pub published: DateTime<Utc>,
    /// Watch URL.
    pub link: String,
}

/// Closed publication window `[start, end]`, both bounds in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(DigestError::Config(format!(
                "Time window start ({}) is after its end ({})",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Build a window from two user-supplied bounds. See [`parse_bound`].
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_bound(start)?, parse_bound(end)?)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Inclusive on both ends.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Parse a window bound and convert it to UTC.
///
/// RFC 3339 input keeps its offset. Naive `YYYY-MM-DD HH:MM[:SS]` (or with a
/// `T` separator) and bare `YYYY-MM-DD` (midnight) are read as local time.
pub fn parse_bound(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| DigestError::InvalidInput(format!("Unrecognized date/time: {}", input)))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            DigestError::InvalidInput(format!("Local time does not exist: {}", input))
        })
}

/// Parse an entry's published timestamp (RFC 3339, falling back to RFC 2822).
pub fn parse_published(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DigestError::Feed(format!("Bad timestamp '{}': {}", raw, e)))
}

/// One raw entry from a channel feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    pub link: String,
    /// Unparsed published timestamp, as found in the feed.
    pub published: String,
}

/// A fetched and parsed channel feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub channel_title: String,
    pub entries: Vec<FeedEntry>,
}

/// Locates and downloads channel feeds.
#[async_trait]
pub trait FeedResolver: Send + Sync {
    /// Map a channel reference to its feed URL, if one can be found.
    async fn resolve(&self, reference: &str) -> Option<String>;

    /// Download and parse a feed.
    async fn fetch_feed(&self, feed_url: &str) -> Result<FeedDocument>;
}

/// Collect every video from `references` published inside `window`.
#[instrument(skip_all, fields(references = references.len()))]
pub async fn discover(
    resolver: &dyn FeedResolver,
    references: &[String],
    window: &TimeWindow,
    log: &RunLogger,
) -> Vec<VideoItem> {
    log.info("Checking for new videos...");
    let mut found = Vec::new();

    for reference in references {
        let Some(feed_url) = resolver.resolve(reference).await else {
            log.warning(format!("Could not find RSS feed for {}", reference));
            continue;
        };

        log.info(format!("Fetching RSS feed: {}", feed_url));
        let feed = match resolver.fetch_feed(&feed_url).await {
            Ok(feed) => feed,
            Err(e) => {
                log.warning(format!("Error parsing feed {}: {}", feed_url, e));
                continue;
            }
        };

        found.extend(filter_entries(feed, window, log));
    }

    found
}

/// Window-filter and deduplicate the entries of one feed.
fn filter_entries(feed: FeedDocument, window: &TimeWindow, log: &RunLogger) -> Vec<VideoItem> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for entry in feed.entries {
        let published = match parse_published(&entry.published) {
            Ok(published) => published,
            Err(e) => {
                log.warning(format!("Error parsing date for {}: {}", entry.title, e));
                continue;
            }
        };

        if !window.contains(published) || !seen.insert(entry.id.clone()) {
            continue;
        }

        log.info(format!("Found match: {} ({})", entry.title, published));
        items.push(VideoItem {
            id: entry.id,
            title: entry.title,
            channel_name: feed.channel_title.clone(),
            published,
            link: entry.link,
        });
    }

    items
}
