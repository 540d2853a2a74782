//! Conflict-free snapshot merging.
//!
//! Pure functions over snapshot values; no I/O. Set-valued fields merge by
//! union, tag maps union per key, category maps let the remote side win on a
//! conflicting key, and logical timestamps take the max. Merging with an
//! absent counterpart returns the present side verbatim.

use super::records::{ReadStatusSnapshot, SubscriptionSnapshot};

pub fn merge_subscriptions(
    local: Option<SubscriptionSnapshot>,
    remote: Option<SubscriptionSnapshot>,
) -> Option<SubscriptionSnapshot> {
    match (local, remote) {
        (None, None) => None,
        (Some(local), None) => Some(local),
        (None, Some(remote)) => Some(remote),
        (Some(local), Some(remote)) => {
            let mut merged = SubscriptionSnapshot {
                last_updated: local.last_updated.max(remote.last_updated),
                ..SubscriptionSnapshot::default()
            };

            merged.rss_urls = local.rss_urls;
            merged.rss_urls.extend(remote.rss_urls);

            merged.nostr_authors = local.nostr_authors;
            merged.nostr_authors.extend(remote.nostr_authors);

            merged.tag_assignments = local.tag_assignments;
            for (feed_id, tags) in remote.tag_assignments {
                merged
                    .tag_assignments
                    .entry(feed_id)
                    .or_default()
                    .extend(tags);
            }

            // Remote overwrites local on a conflicting category assignment.
            merged.category_assignments = local.category_assignments;
            merged.category_assignments.extend(remote.category_assignments);

            merged.deleted_feeds = local.deleted_feeds;
            merged.deleted_feeds.extend(remote.deleted_feeds);

            Some(merged)
        }
    }
}

pub fn merge_read_status(
    local: Option<ReadStatusSnapshot>,
    remote: Option<ReadStatusSnapshot>,
) -> Option<ReadStatusSnapshot> {
    match (local, remote) {
        (None, None) => None,
        (Some(local), None) => Some(local),
        (None, Some(remote)) => Some(remote),
        (Some(local), Some(remote)) => {
            let mut guids = local.read_item_guids;
            guids.extend(remote.read_item_guids);
            Some(ReadStatusSnapshot {
                read_item_guids: guids,
                last_updated: local.last_updated.max(remote.last_updated),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::sync::records::CategoryInfo;

    fn set(values: &[&str]) -> HashSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn category(name: &str) -> CategoryInfo {
        CategoryInfo {
            name: name.to_string(),
            color: "#112233".to_string(),
            icon: "*".to_string(),
        }
    }

    fn sample_subscriptions() -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            rss_urls: set(&["https://a.example/feed.xml", "https://b.example/rss"]),
            nostr_authors: set(&["npub1author"]),
            tag_assignments: HashMap::from([(
                "https://a.example/feed.xml".to_string(),
                set(&["news"]),
            )]),
            category_assignments: HashMap::from([(
                "https://a.example/feed.xml".to_string(),
                category("News"),
            )]),
            deleted_feeds: set(&["https://gone.example/feed.xml"]),
            last_updated: 100,
        }
    }

    #[test]
    fn merge_with_absent_side_is_identity() {
        let snapshot = sample_subscriptions();
        assert_eq!(
            merge_subscriptions(Some(snapshot.clone()), None),
            Some(snapshot.clone())
        );
        assert_eq!(
            merge_subscriptions(None, Some(snapshot.clone())),
            Some(snapshot)
        );
        assert_eq!(merge_subscriptions(None, None), None);

        let reads = ReadStatusSnapshot {
            read_item_guids: set(&["g1"]),
            last_updated: 7,
        };
        assert_eq!(merge_read_status(Some(reads.clone()), None), Some(reads.clone()));
        assert_eq!(merge_read_status(None, Some(reads.clone())), Some(reads));
        assert_eq!(merge_read_status(None, None), None);
    }

    #[test]
    fn merge_is_idempotent() {
        let snapshot = sample_subscriptions();
        let merged =
            merge_subscriptions(Some(snapshot.clone()), Some(snapshot.clone())).unwrap();
        assert_eq!(merged, snapshot);
    }

    #[test]
    fn union_fields_commute() {
        let a = SubscriptionSnapshot {
            rss_urls: set(&["https://a.example/feed.xml"]),
            nostr_authors: set(&["npub1one"]),
            deleted_feeds: set(&["https://x.example"]),
            last_updated: 10,
            ..SubscriptionSnapshot::default()
        };
        let b = SubscriptionSnapshot {
            rss_urls: set(&["https://b.example/rss"]),
            nostr_authors: set(&["npub1two"]),
            deleted_feeds: set(&["https://y.example"]),
            last_updated: 20,
            ..SubscriptionSnapshot::default()
        };

        let ab = merge_subscriptions(Some(a.clone()), Some(b.clone())).unwrap();
        let ba = merge_subscriptions(Some(b), Some(a)).unwrap();

        assert_eq!(ab.rss_urls, ba.rss_urls);
        assert_eq!(ab.nostr_authors, ba.nostr_authors);
        assert_eq!(ab.deleted_feeds, ba.deleted_feeds);
        assert_eq!(ab.last_updated, 20);
        assert_eq!(ba.last_updated, 20);
    }

    #[test]
    fn read_guids_union_commutes() {
        let a = ReadStatusSnapshot {
            read_item_guids: set(&["g1", "g2"]),
            last_updated: 5,
        };
        let b = ReadStatusSnapshot {
            read_item_guids: set(&["g2", "g3"]),
            last_updated: 9,
        };

        let ab = merge_read_status(Some(a.clone()), Some(b.clone())).unwrap();
        let ba = merge_read_status(Some(b), Some(a)).unwrap();

        assert_eq!(ab.read_item_guids, set(&["g1", "g2", "g3"]));
        assert_eq!(ab.read_item_guids, ba.read_item_guids);
        assert_eq!(ab.last_updated, 9);
    }

    #[test]
    fn tag_conflict_resolves_to_symmetric_union() {
        let local = SubscriptionSnapshot {
            tag_assignments: HashMap::from([("f1".to_string(), set(&["a"]))]),
            ..SubscriptionSnapshot::default()
        };
        let remote = SubscriptionSnapshot {
            tag_assignments: HashMap::from([("f1".to_string(), set(&["b"]))]),
            ..SubscriptionSnapshot::default()
        };

        let merged = merge_subscriptions(Some(local), Some(remote)).unwrap();
        assert_eq!(merged.tag_assignments["f1"], set(&["a", "b"]));
    }

    #[test]
    fn tag_keys_present_on_one_side_copy_through() {
        let local = SubscriptionSnapshot {
            tag_assignments: HashMap::from([("f1".to_string(), set(&["a"]))]),
            ..SubscriptionSnapshot::default()
        };
        let remote = SubscriptionSnapshot {
            tag_assignments: HashMap::from([("f2".to_string(), set(&["b"]))]),
            ..SubscriptionSnapshot::default()
        };

        let merged = merge_subscriptions(Some(local), Some(remote)).unwrap();
        assert_eq!(merged.tag_assignments["f1"], set(&["a"]));
        assert_eq!(merged.tag_assignments["f2"], set(&["b"]));
    }

    #[test]
    fn category_conflict_is_remote_wins() {
        let local = SubscriptionSnapshot {
            category_assignments: HashMap::from([("f1".to_string(), category("Local"))]),
            ..SubscriptionSnapshot::default()
        };
        let remote = SubscriptionSnapshot {
            category_assignments: HashMap::from([("f1".to_string(), category("Remote"))]),
            ..SubscriptionSnapshot::default()
        };

        let merged =
            merge_subscriptions(Some(local.clone()), Some(remote.clone())).unwrap();
        assert_eq!(merged.category_assignments["f1"].name, "Remote");

        // Swapping argument order still favors whichever side is remote.
        let merged = merge_subscriptions(Some(remote), Some(local)).unwrap();
        assert_eq!(merged.category_assignments["f1"].name, "Local");
    }

    #[test]
    fn deleted_feeds_survive_merging_but_do_not_prune_unions() {
        let local = SubscriptionSnapshot {
            deleted_feeds: set(&["https://a.example/feed.xml"]),
            ..SubscriptionSnapshot::default()
        };
        let remote = SubscriptionSnapshot {
            rss_urls: set(&["https://a.example/feed.xml"]),
            ..SubscriptionSnapshot::default()
        };

        let merged = merge_subscriptions(Some(local), Some(remote)).unwrap();
        // The tombstoned URL still unions back in; tombstones are recorded
        // but not enforced here.
        assert!(merged.rss_urls.contains("https://a.example/feed.xml"));
        assert!(merged.deleted_feeds.contains("https://a.example/feed.xml"));
    }
}
