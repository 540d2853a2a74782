use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_rs::parser;
use futures::stream::{self, StreamExt};
use nostr_sdk::prelude::*;
use regex::Regex;
use reqwest::Client;

use crate::error::Result;
use crate::models::{Feed, FeedKind, NewFeedItem};
use crate::nostr::RelayTransport;

const NOSTR_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const NOSTR_ARTICLE_LIMIT: usize = 50;

pub struct FeedFetcher {
    client: Client,
    transport: Arc<dyn RelayTransport>,
}

impl FeedFetcher {
    pub fn new(transport: Arc<dyn RelayTransport>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("feedstr/0.3")
            .build()
            .expect("Failed to create HTTP client");

        Self { client, transport }
    }

    pub async fn fetch_rss(&self, feed_id: i64, url: &str) -> Result<Vec<NewFeedItem>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;

        let items: Vec<NewFeedItem> = feed
            .entries
            .into_iter()
            .map(|entry| {
                // Prefer full content, fall back to the summary
                let content = entry
                    .content
                    .as_ref()
                    .and_then(|c| c.body.clone())
                    .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));

                let url = entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default();

                // Some feeds omit entry ids; the link still identifies the item
                let guid = if entry.id.is_empty() {
                    url.clone()
                } else {
                    entry.id
                };

                let (thumbnail, video_id) = extract_media(&entry.media);

                NewFeedItem {
                    feed_id,
                    guid,
                    title: entry
                        .title
                        .map(|t| t.content)
                        .unwrap_or_else(|| "Untitled".to_string()),
                    content,
                    url,
                    author: entry.authors.first().map(|a| a.name.clone()),
                    published_at: entry.published.or(entry.updated).unwrap_or_else(Utc::now),
                    thumbnail,
                    video_id,
                }
            })
            .collect();

        Ok(items)
    }

    /// Fetch an author's long-form articles (kind 30023) from the relays.
    pub async fn fetch_nostr(&self, feed_id: i64, npub: &str) -> Result<Vec<NewFeedItem>> {
        let author = PublicKey::parse(npub)
            .map_err(|e| anyhow::anyhow!("invalid author key {}: {}", npub, e))?;

        let filter = Filter::new()
            .author(author)
            .kind(Kind::LongFormTextNote)
            .limit(NOSTR_ARTICLE_LIMIT);
        let events = self.transport.query(filter, NOSTR_FETCH_TIMEOUT).await?;

        let items = events
            .into_iter()
            .map(|event| {
                let mut title = String::new();
                let mut thumbnail = None;
                let mut published_at = timestamp_to_datetime(event.created_at);

                for tag in event.tags.iter() {
                    if let [name, value, ..] = tag.as_slice() {
                        match name.as_str() {
                            "title" => title = value.clone(),
                            "image" => thumbnail = Some(value.clone()),
                            "published_at" => {
                                if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
                                    published_at = ts.with_timezone(&Utc);
                                }
                            }
                            _ => {}
                        }
                    }
                }

                let url = event
                    .id
                    .to_bech32()
                    .map(|note| format!("nostr:{note}"))
                    .unwrap_or_else(|_| format!("nostr:{}", event.id));

                // Short pubkey until the profile name is known
                let author = {
                    let hex = event.pubkey.to_hex();
                    format!("{}...", &hex[..8])
                };

                NewFeedItem {
                    feed_id,
                    guid: event.id.to_hex(),
                    title: if title.is_empty() {
                        "Untitled".to_string()
                    } else {
                        title
                    },
                    content: Some(event.content),
                    url,
                    author: Some(author),
                    published_at,
                    thumbnail,
                    video_id: None,
                }
            })
            .collect();

        Ok(items)
    }

    /// Refresh all feeds concurrently with rate limiting
    pub async fn refresh_all(&self, feeds: Vec<Feed>) -> Vec<(i64, Vec<NewFeedItem>)> {
        let results: Vec<_> = stream::iter(feeds)
            .map(|feed| async move {
                let result = match feed.kind {
                    FeedKind::Rss => self.fetch_rss(feed.id, &feed.url).await,
                    FeedKind::Nostr => match &feed.author_id {
                        Some(npub) => self.fetch_nostr(feed.id, npub).await,
                        None => Ok(Vec::new()),
                    },
                };
                match result {
                    Ok(items) => {
                        tracing::debug!("Fetched {} items from {}", items.len(), feed.title);
                        Some((feed.id, items))
                    }
                    Err(e) => {
                        tracing::debug!("Failed to fetch {}: {}", feed.url, e);
                        None
                    }
                }
            })
            .buffer_unordered(5) // Max 5 concurrent fetches
            .filter_map(|r| async { r })
            .collect()
            .await;

        results
    }

    /// Fetch a feed's real title and description for a provisionally named row.
    pub async fn fetch_rss_metadata(&self, url: &str) -> Result<(String, Option<String>)> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])?;

        let title = feed
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled Feed".to_string());
        let description = feed.description.map(|d| d.content);

        Ok((title, description))
    }

    /// Fetch an author's profile (kind 0) for a provisionally named row.
    pub async fn fetch_profile(&self, npub: &str) -> Result<Option<Metadata>> {
        let author = PublicKey::parse(npub)
            .map_err(|e| anyhow::anyhow!("invalid author key {}: {}", npub, e))?;

        let filter = Filter::new().author(author).kind(Kind::Metadata).limit(1);
        let events = self.transport.query(filter, NOSTR_FETCH_TIMEOUT).await?;

        let Some(event) = events.into_iter().max_by_key(|e| e.created_at) else {
            return Ok(None);
        };

        Ok(Metadata::from_json(&event.content).ok())
    }
}

fn timestamp_to_datetime(ts: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.as_u64() as i64, 0).unwrap_or_else(Utc::now)
}

/// Pull a thumbnail and, for video enclosures, a video id out of entry media.
fn extract_media(media: &[feed_rs::model::MediaObject]) -> (Option<String>, Option<String>) {
    let mut thumbnail = None;
    let mut video_id = None;

    for object in media {
        if thumbnail.is_none() {
            if let Some(thumb) = object.thumbnails.first() {
                thumbnail = Some(thumb.image.uri.clone());
            }
        }
        for content in &object.content {
            let Some(mime) = &content.content_type else {
                continue;
            };
            let Some(url) = &content.url else {
                continue;
            };
            match mime.ty().as_str() {
                "image" => {
                    if thumbnail.is_none() {
                        thumbnail = Some(url.to_string());
                    }
                }
                "video" => {
                    if thumbnail.is_none() {
                        thumbnail = Some(url.to_string());
                    }
                    if video_id.is_none() {
                        video_id = extract_video_id(url.as_str());
                    }
                }
                _ => {}
            }
        }
    }

    (thumbnail, video_id)
}

fn extract_video_id(url: &str) -> Option<String> {
    let re = Regex::new(
        r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([A-Za-z0-9_-]{6,})",
    )
    .ok()?;
    re.captures(url)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::extract_video_id;

    #[test]
    fn extracts_video_ids_from_common_url_shapes() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(extract_video_id("https://example.com/video.mp4"), None);
    }
}
