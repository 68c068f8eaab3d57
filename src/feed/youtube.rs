//! YouTube channel feed resolution and parsing.

use super::{FeedDocument, FeedEntry, FeedResolver};
use crate::error::{DigestError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

const FEED_BASE_URL: &str = "https://www.youtube.com/feeds/videos.xml";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Resolves YouTube channel references to their Atom feeds.
pub struct YoutubeFeedResolver {
    http: reqwest::Client,
    rss_link_regex: Regex,
    href_regex: Regex,
    channel_id_regex: Regex,
}

impl YoutubeFeedResolver {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            rss_link_regex: Regex::new(r#"<link[^>]*type="application/rss\+xml"[^>]*>"#)
                .expect("Invalid regex"),
            href_regex: Regex::new(r#"href="([^"]+)""#).expect("Invalid regex"),
            channel_id_regex: Regex::new(
                r#"(?:"externalId"|"channelId"|itemprop="identifier" content=)\s*:?\s*"(UC[\w-]{22})""#,
            )
            .expect("Invalid regex"),
        })
    }

    /// Feed URL for a channel id.
    pub fn feed_url_for_channel(channel_id: &str) -> String {
        format!("{}?channel_id={}", FEED_BASE_URL, channel_id)
    }

    /// Resolve without touching the network, when the reference already
    /// names the feed or the channel id.
    fn resolve_offline(reference: &str) -> Option<String> {
        if reference.contains("feeds/videos.xml") {
            return Some(reference.to_string());
        }

        if is_channel_id(reference) {
            return Some(Self::feed_url_for_channel(reference));
        }

        let url = Url::parse(reference).ok()?;
        let mut segments = url.path_segments()?;
        match (segments.next(), segments.next()) {
            (Some("channel"), Some(id)) if is_channel_id(id) => {
                Some(Self::feed_url_for_channel(id))
            }
            _ => None,
        }
    }

    /// Pull the feed URL (or the channel id) out of a channel page.
    fn extract_from_page(&self, html: &str) -> Option<String> {
        if let Some(href) = self
            .rss_link_regex
            .find(html)
            .and_then(|tag| self.href_regex.captures(tag.as_str()))
            .and_then(|caps| caps.get(1))
        {
            return Some(href.as_str().replace("&amp;", "&"));
        }

        self.channel_id_regex
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|id| Self::feed_url_for_channel(id.as_str()))
    }

    #[instrument(skip(self))]
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl FeedResolver for YoutubeFeedResolver {
    async fn resolve(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        if let Some(feed) = Self::resolve_offline(reference) {
            return Some(feed);
        }

        let page_url = if reference.starts_with('@') {
            format!("https://www.youtube.com/{}", reference)
        } else {
            reference.to_string()
        };

        match self.fetch_page(&page_url).await {
            Ok(html) => {
                let feed = self.extract_from_page(&html);
                debug!(?feed, "Resolved channel page");
                feed
            }
            Err(e) => {
                warn!("Error fetching RSS URL for {}: {}", page_url, e);
                None
            }
        }
    }

    #[instrument(skip(self))]
    async fn fetch_feed(&self, feed_url: &str) -> Result<FeedDocument> {
        let body = self.fetch_page(feed_url).await?;
        parse_atom_feed(&body)
    }
}

fn is_channel_id(candidate: &str) -> bool {
    candidate.len() == 24
        && candidate.starts_with("UC")
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Parse a channel feed.
///
/// Handles the Atom format YouTube serves (`<feed><entry>…`) and, for other
/// sources, plain RSS 2.0 (`<rss><channel><item>…`).
pub fn parse_atom_feed(xml: &str) -> Result<FeedDocument> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| DigestError::Feed(format!("XML parse error: {}", e)))?;

    let root = doc.root_element();
    match root.tag_name().name() {
        "feed" => Ok(parse_atom(root)),
        "rss" => root
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "channel")
            .map(parse_rss_channel)
            .ok_or_else(|| DigestError::Feed("RSS document has no <channel>".to_string())),
        other => Err(DigestError::Feed(format!(
            "Unsupported feed root element <{}>",
            other
        ))),
    }
}

fn child_text<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(str::trim)
}

fn parse_atom(feed: roxmltree::Node) -> FeedDocument {
    let channel_title = child_text(feed, "title")
        .filter(|t| !t.is_empty())
        .unwrap_or("Unknown Channel")
        .to_string();

    let entries = feed
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "entry")
        .filter_map(|entry| {
            let id = child_text(entry, "videoId")
                .map(str::to_string)
                .or_else(|| {
                    child_text(entry, "id")
                        .map(|id| id.trim_start_matches("yt:video:").to_string())
                })?;

            let link = entry
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "link")
                .find(|n| n.attribute("rel").map_or(true, |rel| rel == "alternate"))
                .and_then(|n| n.attribute("href"))
                .map(str::to_string)
                .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", id));

            Some(FeedEntry {
                title: child_text(entry, "title").unwrap_or("Unknown Title").to_string(),
                published: child_text(entry, "published")
                    .or_else(|| child_text(entry, "updated"))
                    .unwrap_or_default()
                    .to_string(),
                id,
                link,
            })
        })
        .collect();

    FeedDocument {
        channel_title,
        entries,
    }
}

fn parse_rss_channel(channel: roxmltree::Node) -> FeedDocument {
    let channel_title = child_text(channel, "title")
        .filter(|t| !t.is_empty())
        .unwrap_or("Unknown Channel")
        .to_string();

    let entries = channel
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "item")
        .filter_map(|item| {
            let link = child_text(item, "link")?.to_string();
            let id = child_text(item, "guid")
                .map(str::to_string)
                .unwrap_or_else(|| link.clone());
            Some(FeedEntry {
                id,
                title: child_text(item, "title").unwrap_or("Unknown Title").to_string(),
                link,
                published: child_text(item, "pubDate").unwrap_or_default().to_string(),
            })
        })
        .collect();

    FeedDocument {
        channel_title,
        entries,
    }
}
