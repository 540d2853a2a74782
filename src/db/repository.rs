use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    Category, Feed, FeedItem, FeedKind, NewFeed, NewFeedItem, Tag, UNCATEGORIZED_CATEGORY_ID,
};

use super::schema::SCHEMA;

/// Durable store of feeds, articles, tags and categories.
///
/// Cloning is cheap: all clones share one serialized connection, so writes
/// issued from concurrent background tasks never interleave mid-statement.
#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Feed operations

    /// Insert a feed, returning its id, or `None` when a row with the same
    /// (kind, url) or (kind, author) already exists.
    pub async fn create_feed(&self, feed: NewFeed) -> Result<Option<i64>> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT OR IGNORE INTO feeds (kind, url, author_id, title, description, category_id)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                    params![
                        feed.kind.as_str(),
                        feed.url,
                        feed.author_id,
                        feed.title,
                        feed.description,
                        feed.category_id,
                    ],
                )?;
                if conn.changes() > 0 {
                    Ok(Some(conn.last_insert_rowid()))
                } else {
                    Ok(None)
                }
            })
            .await?;
        Ok(id)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let url = url.to_string();
        let feed = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{FEED_COLUMNS} FROM feeds WHERE url = ?1"
                ))?;
                let feed = stmt
                    .query_row(params![url], |row| Ok(feed_from_row(row)))
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("{FEED_COLUMNS} FROM feeds ORDER BY title"))?;
                let feeds = stmt
                    .query_map([], |row| Ok(feed_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn get_feeds_by_category(&self, category_id: &str) -> Result<Vec<Feed>> {
        let category_id = category_id.to_string();
        let feeds = self
            .conn
            .call(move |conn| {
                let sql = if category_id == UNCATEGORIZED_CATEGORY_ID {
                    format!(
                        "{FEED_COLUMNS} FROM feeds \
                         WHERE category_id IS NULL OR category_id = '' ORDER BY title"
                    )
                } else {
                    format!("{FEED_COLUMNS} FROM feeds WHERE category_id = ?1 ORDER BY title")
                };
                let mut stmt = conn.prepare(&sql)?;
                let feeds = if category_id == UNCATEGORIZED_CATEGORY_ID {
                    stmt.query_map([], |row| Ok(feed_from_row(row)))?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                } else {
                    stmt.query_map(params![category_id], |row| Ok(feed_from_row(row)))?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                };
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn get_feeds_by_tag(&self, tag_id: i64) -> Result<Vec<Feed>> {
        let feeds = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{FEED_COLUMNS_QUALIFIED} FROM feeds f \
                     JOIN feed_tags ft ON f.id = ft.feed_id \
                     WHERE ft.tag_id = ?1 ORDER BY f.title"
                ))?;
                let feeds = stmt
                    .query_map(params![tag_id], |row| Ok(feed_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn update_feed_metadata(
        &self,
        id: i64,
        title: String,
        description: Option<String>,
    ) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE feeds SET title = ?1, description = COALESCE(?2, description) WHERE id = ?3",
                    params![title, description, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn update_feed_last_fetched(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE feeds SET last_fetched_at = datetime('now') WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn set_feed_category(&self, id: i64, category_id: String) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE feeds SET category_id = ?1 WHERE id = ?2",
                    params![category_id, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn delete_feed(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM feed_tags WHERE feed_id = ?1", params![id])?;
                conn.execute("DELETE FROM feed_items WHERE feed_id = ?1", params![id])?;
                conn.execute("DELETE FROM feeds WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Article operations

    /// Insert an article if it is new; re-fetched items are ignored.
    pub async fn insert_item(&self, item: NewFeedItem) -> Result<bool> {
        let created = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT OR IGNORE INTO feed_items
                       (feed_id, guid, title, content, url, author, published_at, thumbnail, video_id)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                    params![
                        item.feed_id,
                        item.guid,
                        item.title,
                        item.content,
                        item.url,
                        item.author,
                        item.published_at.to_rfc3339(),
                        item.thumbnail,
                        item.video_id,
                    ],
                )?;
                Ok(conn.changes() > 0)
            })
            .await?;
        Ok(created)
    }

    pub async fn get_all_items_sorted(&self) -> Result<Vec<FeedItem>> {
        let items = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "{ITEM_COLUMNS} FROM feed_items i \
                     JOIN feeds f ON i.feed_id = f.id \
                     ORDER BY i.published_at DESC"
                ))?;
                let items = stmt
                    .query_map([], |row| Ok(item_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    pub async fn get_items_for_feeds(&self, feed_ids: Vec<i64>) -> Result<Vec<FeedItem>> {
        if feed_ids.is_empty() {
            return Ok(Vec::new());
        }
        let items = self
            .conn
            .call(move |conn| {
                let placeholders = feed_ids
                    .iter()
                    .map(|_| "?")
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut stmt = conn.prepare(&format!(
                    "{ITEM_COLUMNS} FROM feed_items i \
                     JOIN feeds f ON i.feed_id = f.id \
                     WHERE i.feed_id IN ({placeholders}) \
                     ORDER BY i.published_at DESC"
                ))?;
                let items = stmt
                    .query_map(rusqlite::params_from_iter(feed_ids), |row| {
                        Ok(item_from_row(row))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    pub async fn mark_item_read(&self, id: i64, is_read: bool) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE feed_items SET is_read = ?1 WHERE id = ?2",
                    params![is_read, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Mark every article carrying this GUID as read. Returns whether any
    /// row matched; an unknown GUID is not an error.
    pub async fn mark_read_by_guid(&self, guid: &str) -> Result<bool> {
        let guid = guid.to_string();
        let matched = self
            .conn
            .call(move |conn| {
                let changed =
                    conn.execute("UPDATE feed_items SET is_read = 1 WHERE guid = ?1", params![guid])?;
                Ok(changed > 0)
            })
            .await?;
        Ok(matched)
    }

    pub async fn toggle_item_favorite(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE feed_items SET is_favorite = NOT is_favorite WHERE id = ?1",
                    params![id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_read_guids(&self) -> Result<Vec<String>> {
        let guids = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT guid FROM feed_items WHERE is_read = 1")?;
                let guids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(guids)
            })
            .await?;
        Ok(guids)
    }

    pub async fn unread_counts(&self) -> Result<HashMap<i64, i64>> {
        let counts = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT feed_id, COUNT(*) FROM feed_items WHERE is_read = 0 GROUP BY feed_id",
                )?;
                let counts = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<HashMap<i64, i64>, _>>()?;
                Ok(counts)
            })
            .await?;
        Ok(counts)
    }

    // Tag operations

    /// Create a tag if absent and return its id either way.
    pub async fn create_tag(&self, name: &str) -> Result<i64> {
        let name = name.to_string();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])?;
                let id =
                    conn.query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    pub async fn get_all_tags(&self) -> Result<Vec<Tag>> {
        let tags = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY name")?;
                let tags = stmt
                    .query_map([], |row| {
                        Ok(Tag {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(tags)
            })
            .await?;
        Ok(tags)
    }

    pub async fn link_feed_tag(&self, feed_id: i64, tag_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO feed_tags (feed_id, tag_id) VALUES (?1, ?2)",
                    params![feed_id, tag_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Every (feed identifier, tag name) pair, for snapshot assembly.
    pub async fn feed_tag_pairs(&self) -> Result<Vec<(String, String)>> {
        let pairs = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT f.url, t.name FROM feed_tags ft \
                     JOIN feeds f ON ft.feed_id = f.id \
                     JOIN tags t ON ft.tag_id = t.id",
                )?;
                let pairs = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(pairs)
            })
            .await?;
        Ok(pairs)
    }

    // Category operations

    pub async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let name = name.to_string();
        let category = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, color, icon, sort_order FROM categories WHERE name = ?1",
                )?;
                let category = stmt
                    .query_row(params![name], |row| Ok(category_from_row(row)))
                    .optional()?;
                Ok(category)
            })
            .await?;
        Ok(category)
    }

    pub async fn create_category(&self, category: Category) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO categories (id, name, color, icon, sort_order) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        category.id,
                        category.name,
                        category.color,
                        category.icon,
                        category.sort_order
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Persisted categories, headed by the synthetic "uncategorized" entry.
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut categories = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, color, icon, sort_order FROM categories \
                     ORDER BY sort_order, name",
                )?;
                let categories = stmt
                    .query_map([], |row| Ok(category_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(categories)
            })
            .await?;
        categories.insert(
            0,
            Category {
                id: UNCATEGORIZED_CATEGORY_ID.to_string(),
                name: "Uncategorized".to_string(),
                color: None,
                icon: None,
                sort_order: -1,
            },
        );
        Ok(categories)
    }

    /// Category rows keyed by id, without the synthetic head entry.
    pub async fn categories_by_id(&self) -> Result<HashMap<String, Category>> {
        let categories = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, color, icon, sort_order FROM categories")?;
                let categories = stmt
                    .query_map([], |row| {
                        let cat = category_from_row(row);
                        Ok((cat.id.clone(), cat))
                    })?
                    .collect::<std::result::Result<HashMap<_, _>, _>>()?;
                Ok(categories)
            })
            .await?;
        Ok(categories)
    }

    // Preferences

    pub async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        let value = self
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM preferences WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    /// Remember that the user removed a feed. Tombstones ride along in
    /// published snapshots; merging does not yet prune against them.
    pub async fn record_feed_deletion(&self, identifier: &str) -> Result<()> {
        let mut deleted = self.deleted_feed_identifiers().await?;
        deleted.insert(identifier.to_string());
        let value = serde_json::to_string(&deleted)?;
        self.set_preference(DELETED_FEEDS_PREF, &value).await
    }

    pub async fn deleted_feed_identifiers(&self) -> Result<HashSet<String>> {
        match self.get_preference(DELETED_FEEDS_PREF).await? {
            Some(value) => Ok(serde_json::from_str(&value).unwrap_or_default()),
            None => Ok(HashSet::new()),
        }
    }

    pub async fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO preferences (key, value) VALUES (?1, ?2) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

const DELETED_FEEDS_PREF: &str = "deleted_feeds";

const FEED_COLUMNS: &str = "SELECT id, kind, url, author_id, title, description, \
                            last_fetched_at, category_id, created_at";
const FEED_COLUMNS_QUALIFIED: &str =
    "SELECT f.id, f.kind, f.url, f.author_id, f.title, f.description, \
     f.last_fetched_at, f.category_id, f.created_at";
const ITEM_COLUMNS: &str = "SELECT i.id, i.feed_id, i.guid, i.title, i.content, i.url, \
                            i.author, i.published_at, i.is_read, i.is_favorite, \
                            i.thumbnail, i.video_id, i.created_at, f.title";

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn feed_from_row(row: &Row) -> Feed {
    let kind: String = row.get(1).unwrap();
    Feed {
        id: row.get(0).unwrap(),
        kind: FeedKind::parse(&kind).unwrap_or(FeedKind::Rss),
        url: row.get(2).unwrap(),
        author_id: row.get(3).unwrap(),
        title: row.get(4).unwrap(),
        description: row.get(5).unwrap(),
        last_fetched_at: row
            .get::<_, Option<String>>(6)
            .unwrap()
            .and_then(|s| parse_datetime(&s)),
        category_id: row.get(7).unwrap(),
        created_at: row
            .get::<_, String>(8)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    }
}

fn item_from_row(row: &Row) -> FeedItem {
    FeedItem {
        id: row.get(0).unwrap(),
        feed_id: row.get(1).unwrap(),
        guid: row.get(2).unwrap(),
        title: row.get(3).unwrap(),
        content: row.get(4).unwrap(),
        url: row.get(5).unwrap(),
        author: row.get(6).unwrap(),
        published_at: row
            .get::<_, String>(7)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        is_read: row.get::<_, i64>(8).unwrap() != 0,
        is_favorite: row.get::<_, i64>(9).unwrap() != 0,
        thumbnail: row.get(10).unwrap(),
        video_id: row.get(11).unwrap(),
        created_at: row
            .get::<_, String>(12)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        feed_title: row.get(13).unwrap(),
    }
}

fn category_from_row(row: &Row) -> Category {
    Category {
        id: row.get(0).unwrap(),
        name: row.get(1).unwrap(),
        color: row.get(2).unwrap(),
        icon: row.get(3).unwrap(),
        sort_order: row.get(4).unwrap(),
    }
}
