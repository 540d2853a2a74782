use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category identifier assigned to feeds created by a sync cycle. Not a
/// persisted category row; the user is expected to re-file synced feeds.
pub const SYNCED_CATEGORY_ID: &str = "synced";

/// Synthetic category injected at the head of category listings. Represents
/// feeds with no category assignment and is never persisted.
pub const UNCATEGORIZED_CATEGORY_ID: &str = "uncategorized";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedKind {
    Rss,
    Nostr,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Rss => "rss",
            FeedKind::Nostr => "nostr",
        }
    }

    pub fn parse(s: &str) -> Option<FeedKind> {
        match s {
            "rss" => Some(FeedKind::Rss),
            "nostr" => Some(FeedKind::Nostr),
            _ => None,
        }
    }
}

/// One followed source, RSS or a Nostr long-form author.
///
/// Nostr feeds carry a synthetic `url` of the form `nostr:<npub>` so both
/// kinds share one identifier namespace; `author_id` holds the bare npub.
#[derive(Debug, Clone)]
pub struct Feed {
    pub id: i64,
    pub kind: FeedKind,
    pub url: String,
    pub author_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub category_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Feed {
    /// Identifier used to join this feed against snapshot maps.
    pub fn identifier(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Clone)]
pub struct NewFeed {
    pub kind: FeedKind,
    pub url: String,
    pub author_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedItem {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub content: Option<String>,
    pub url: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub is_read: bool,
    pub is_favorite: bool,
    pub thumbnail: Option<String>,
    pub video_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Title of the owning feed, joined in for list rendering.
    pub feed_title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewFeedItem {
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub content: Option<String>,
    pub url: String,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub thumbnail: Option<String>,
    pub video_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArticleFilter {
    All,
    #[default]
    Unread,
    Favorites,
}

impl ArticleFilter {
    pub fn cycle(self) -> Self {
        match self {
            ArticleFilter::All => ArticleFilter::Unread,
            ArticleFilter::Unread => ArticleFilter::Favorites,
            ArticleFilter::Favorites => ArticleFilter::All,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ArticleFilter::All => "All",
            ArticleFilter::Unread => "Unread",
            ArticleFilter::Favorites => "Favorites",
        }
    }
}
