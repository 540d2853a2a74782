//! Portable snapshot records and their wire codec.
//!
//! Two replaceable record kinds are published per identity: the subscription
//! list and the read-status list. Each is addressed by a fixed `d` tag, so a
//! relay query with `limit = 1` yields at most one logical current value.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameterized-replaceable kind carrying the subscription list.
pub const SUBSCRIPTION_LIST_KIND: u16 = 30404;
/// Parameterized-replaceable kind carrying the read-status list.
pub const READ_STATUS_KIND: u16 = 30405;

/// `d` tag addressing the subscription slot of an identity.
pub const SUBSCRIPTION_D_TAG: &str = "feedstr-subscriptions";
/// `d` tag addressing the read-status slot of an identity.
pub const READ_STATUS_D_TAG: &str = "feedstr-read-status";

/// `client` tag value stamped on published records.
pub const CLIENT_TAG: &str = "feedstr";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed snapshot payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Everything a device needs to reconstruct "what this user follows".
///
/// Missing fields decode to empty collections; only syntactically invalid
/// payloads are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    /// Followed RSS feed URLs.
    #[serde(default, rename = "rss")]
    pub rss_urls: HashSet<String>,

    /// Followed Nostr long-form authors (bech32 npubs).
    #[serde(default, rename = "nostr")]
    pub nostr_authors: HashSet<String>,

    /// Feed identifier -> tag names.
    #[serde(default, rename = "tags")]
    pub tag_assignments: HashMap<String, HashSet<String>>,

    /// Feed identifier -> category assignment.
    #[serde(default, rename = "categories")]
    pub category_assignments: HashMap<String, CategoryInfo>,

    /// Tombstones for feeds removed locally. Carried through merges but not
    /// yet consulted when applying remote lists, so a deletion can be undone
    /// by a stale snapshot from another device.
    #[serde(default, rename = "deleted")]
    pub deleted_feeds: HashSet<String>,

    /// Informational logical timestamp (unix seconds); max survives a merge.
    #[serde(default, rename = "lastUpdated")]
    pub last_updated: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
}

/// Everything a device needs to reconstruct "what this user has read".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadStatusSnapshot {
    /// Article GUIDs marked read.
    #[serde(default, rename = "itemGuids")]
    pub read_item_guids: HashSet<String>,

    /// Informational logical timestamp (unix seconds); max survives a merge.
    #[serde(default, rename = "lastUpdated")]
    pub last_updated: i64,
}

impl SubscriptionSnapshot {
    pub fn from_content(content: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_content(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ReadStatusSnapshot {
    pub fn from_content(content: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_content(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_subscription_payload() {
        let content = r##"{
            "rss": ["https://a.example/feed.xml"],
            "nostr": ["npub1aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"],
            "tags": {"https://a.example/feed.xml": ["news", "tech"]},
            "categories": {"https://a.example/feed.xml": {"name": "News", "color": "#ff0000", "icon": "N"}},
            "deleted": ["https://gone.example/feed.xml"],
            "lastUpdated": 1700000000
        }"##;

        let snapshot = SubscriptionSnapshot::from_content(content).unwrap();
        assert!(snapshot.rss_urls.contains("https://a.example/feed.xml"));
        assert_eq!(snapshot.nostr_authors.len(), 1);
        assert_eq!(
            snapshot.tag_assignments["https://a.example/feed.xml"],
            HashSet::from(["news".to_string(), "tech".to_string()])
        );
        assert_eq!(
            snapshot.category_assignments["https://a.example/feed.xml"].name,
            "News"
        );
        assert!(snapshot.deleted_feeds.contains("https://gone.example/feed.xml"));
        assert_eq!(snapshot.last_updated, 1700000000);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let snapshot =
            SubscriptionSnapshot::from_content(r#"{"rss": ["https://a.example/feed.xml"]}"#)
                .unwrap();
        assert_eq!(snapshot.rss_urls.len(), 1);
        assert!(snapshot.nostr_authors.is_empty());
        assert!(snapshot.tag_assignments.is_empty());
        assert!(snapshot.category_assignments.is_empty());
        assert!(snapshot.deleted_feeds.is_empty());
        assert_eq!(snapshot.last_updated, 0);
    }

    #[test]
    fn empty_object_decodes_to_default() {
        let snapshot = SubscriptionSnapshot::from_content("{}").unwrap();
        assert_eq!(snapshot, SubscriptionSnapshot::default());
    }

    #[test]
    fn syntactically_invalid_payload_is_rejected() {
        assert!(SubscriptionSnapshot::from_content("not json").is_err());
        assert!(ReadStatusSnapshot::from_content("{\"itemGuids\": [").is_err());
    }

    #[test]
    fn read_status_round_trips_through_content() {
        let mut snapshot = ReadStatusSnapshot::default();
        snapshot.read_item_guids.insert("guid-1".to_string());
        snapshot.last_updated = 42;

        let content = snapshot.to_content().unwrap();
        let decoded = ReadStatusSnapshot::from_content(&content).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn wire_field_names_are_stable() {
        let mut snapshot = SubscriptionSnapshot::default();
        snapshot.rss_urls.insert("https://a.example/feed.xml".to_string());
        let content = snapshot.to_content().unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(value.get("rss").is_some());
        assert!(value.get("tags").is_some());
        assert!(value.get("lastUpdated").is_some());
    }
}
