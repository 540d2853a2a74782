//! End-to-end sync cycle scenarios against an in-memory relay transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use tempfile::TempDir;

use feedstr::db::Repository;
use feedstr::models::{FeedKind, NewFeed, NewFeedItem, SYNCED_CATEGORY_ID};
use feedstr::nostr::{LocalKeySigner, PublishReport, RelayTransport, SignerBackend, TransportError};
use feedstr::sync::records::{
    SubscriptionSnapshot, READ_STATUS_D_TAG, READ_STATUS_KIND, SUBSCRIPTION_D_TAG,
    SUBSCRIPTION_LIST_KIND,
};
use feedstr::sync::{SyncEngine, SyncError};

/// Relay fake: events keyed by kind, optional blanket query failure, and a
/// log of everything published.
#[derive(Default)]
struct FakeTransport {
    events: Mutex<HashMap<u16, Vec<Event>>>,
    published: Mutex<Vec<Event>>,
    fail_queries: AtomicBool,
}

impl FakeTransport {
    fn store(&self, kind: u16, event: Event) {
        self.events.lock().unwrap().entry(kind).or_default().push(event);
    }

    fn published(&self) -> Vec<Event> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelayTransport for FakeTransport {
    async fn query(
        &self,
        filter: Filter,
        _timeout: Duration,
    ) -> Result<Vec<Event>, TransportError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(TransportError::Query("connection timed out".to_string()));
        }
        let Some(kinds) = &filter.kinds else {
            return Ok(Vec::new());
        };
        let events = self.events.lock().unwrap();
        let mut matched = Vec::new();
        for (kind, list) in events.iter() {
            if kinds.iter().any(|k| k.as_u16() == *kind) {
                matched.extend(list.iter().cloned());
            }
        }
        Ok(matched)
    }

    async fn publish(&self, event: Event) -> Result<PublishReport, TransportError> {
        self.published.lock().unwrap().push(event);
        Ok(PublishReport {
            accepted: 1,
            rejected: 0,
        })
    }
}

struct Harness {
    _dir: TempDir,
    repo: Repository,
    transport: Arc<FakeTransport>,
    engine: SyncEngine,
    keys: Keys,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("feeds.db");
    let repo = Repository::new(&db_path.to_string_lossy()).await.unwrap();

    let keys = Keys::generate();
    let signer: Arc<dyn SignerBackend> = Arc::new(
        LocalKeySigner::from_secret(&keys.secret_key().to_secret_hex()).unwrap(),
    );
    let transport = Arc::new(FakeTransport::default());
    let engine = SyncEngine::new(
        repo.clone(),
        Arc::clone(&transport) as Arc<dyn RelayTransport>,
        Some(signer),
    );

    Harness {
        _dir: dir,
        repo,
        transport,
        engine,
        keys,
    }
}

fn record_event(keys: &Keys, kind: u16, d_tag: &str, content: &str, created_at: u64) -> Event {
    EventBuilder::new(Kind::Custom(kind), content)
        .tags([Tag::identifier(d_tag)])
        .custom_created_at(Timestamp::from(created_at))
        .sign_with_keys(keys)
        .unwrap()
}

fn store_subscriptions(h: &Harness, content: &str, created_at: u64) {
    let event = record_event(
        &h.keys,
        SUBSCRIPTION_LIST_KIND,
        SUBSCRIPTION_D_TAG,
        content,
        created_at,
    );
    h.transport.store(SUBSCRIPTION_LIST_KIND, event);
}

fn store_read_status(h: &Harness, content: &str, created_at: u64) {
    let event = record_event(
        &h.keys,
        READ_STATUS_KIND,
        READ_STATUS_D_TAG,
        content,
        created_at,
    );
    h.transport.store(READ_STATUS_KIND, event);
}

#[tokio::test]
async fn remote_feed_materializes_into_the_cache() {
    let h = harness().await;
    store_subscriptions(
        &h,
        r#"{"rss": ["https://a.example/feed.xml"], "nostr": [], "tags": {}, "categories": {}}"#,
        100,
    );

    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.feeds_added, 1);
    assert_eq!(report.tags_imported, 0);
    assert_eq!(report.categories_imported, 0);

    let feeds = h.repo.get_all_feeds().await.unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].kind, FeedKind::Rss);
    assert_eq!(feeds[0].url, "https://a.example/feed.xml");
    assert_eq!(feeds[0].category_id.as_deref(), Some(SYNCED_CATEGORY_ID));
}

#[tokio::test]
async fn second_cycle_adds_nothing() {
    let h = harness().await;
    store_subscriptions(
        &h,
        r#"{"rss": ["https://a.example/feed.xml"], "nostr": ["npub1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq"]}"#,
        100,
    );

    let first = h.engine.run_cycle().await.unwrap();
    assert_eq!(first.feeds_added, 2);

    let second = h.engine.run_cycle().await.unwrap();
    assert_eq!(second.feeds_added, 0);

    assert_eq!(h.repo.get_all_feeds().await.unwrap().len(), 2);
}

#[tokio::test]
async fn absent_snapshot_completes_with_zero_counts() {
    let h = harness().await;

    let report = h.engine.run_cycle().await.unwrap();
    assert!(report.is_empty());
    assert!(h.repo.get_all_feeds().await.unwrap().is_empty());
}

#[tokio::test]
async fn transport_failure_aborts_before_any_mutation() {
    let h = harness().await;
    store_subscriptions(&h, r#"{"rss": ["https://a.example/feed.xml"]}"#, 100);
    h.transport.fail_queries.store(true, Ordering::SeqCst);

    let result = h.engine.run_cycle().await;
    assert!(matches!(result, Err(SyncError::Transport(_))));
    assert!(h.repo.get_all_feeds().await.unwrap().is_empty());
    assert!(h.repo.get_all_tags().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_signer_is_not_authenticated() {
    let h = harness().await;
    let engine = SyncEngine::new(
        h.repo.clone(),
        Arc::clone(&h.transport) as Arc<dyn RelayTransport>,
        None,
    );

    let result = engine.run_cycle().await;
    assert!(matches!(result, Err(SyncError::NotAuthenticated)));
}

#[tokio::test]
async fn undecodable_snapshot_degrades_to_empty() {
    let h = harness().await;
    store_subscriptions(&h, "definitely not json", 100);

    let report = h.engine.run_cycle().await.unwrap();
    assert!(report.is_empty());
    assert!(h.repo.get_all_feeds().await.unwrap().is_empty());
}

#[tokio::test]
async fn newest_candidate_wins_when_relays_disagree() {
    let h = harness().await;
    store_subscriptions(&h, r#"{"rss": ["https://old.example/feed.xml"]}"#, 100);
    store_subscriptions(&h, r#"{"rss": ["https://new.example/feed.xml"]}"#, 200);

    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.feeds_added, 1);

    let feeds = h.repo.get_all_feeds().await.unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].url, "https://new.example/feed.xml");
}

#[tokio::test]
async fn tags_for_unknown_feeds_are_created_but_not_linked() {
    let h = harness().await;
    store_subscriptions(
        &h,
        r#"{"rss": [], "tags": {"https://a.example/feed.xml": ["news", "tech"]}}"#,
        100,
    );

    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.feeds_added, 0);
    assert_eq!(report.tags_imported, 2);

    let tags = h.repo.get_all_tags().await.unwrap();
    let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"news"));
    assert!(names.contains(&"tech"));

    for tag in &tags {
        assert!(h.repo.get_feeds_by_tag(tag.id).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn tags_link_to_feeds_listed_in_the_same_snapshot() {
    let h = harness().await;
    store_subscriptions(
        &h,
        r#"{"rss": ["https://a.example/feed.xml"],
            "tags": {"https://a.example/feed.xml": ["news"]}}"#,
        100,
    );

    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.feeds_added, 1);
    assert_eq!(report.tags_imported, 1);

    let tags = h.repo.get_all_tags().await.unwrap();
    assert_eq!(tags.len(), 1);
    let tagged = h.repo.get_feeds_by_tag(tags[0].id).await.unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].url, "https://a.example/feed.xml");
}

#[tokio::test]
async fn categories_are_created_and_assigned() {
    let h = harness().await;
    store_subscriptions(
        &h,
        r##"{"rss": ["https://a.example/feed.xml"],
            "categories": {"https://a.example/feed.xml":
                {"name": "News", "color": "#ff0000", "icon": "N"}}}"##,
        100,
    );

    let report = h.engine.run_cycle().await.unwrap();
    assert_eq!(report.categories_imported, 1);

    let category = h.repo.get_category_by_name("News").await.unwrap().unwrap();
    assert_eq!(category.color.as_deref(), Some("#ff0000"));
    assert_eq!(category.icon.as_deref(), Some("N"));

    let feeds = h.repo.get_feeds_by_category(&category.id).await.unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].url, "https://a.example/feed.xml");
}

#[tokio::test]
async fn read_status_marks_matching_articles_and_skips_unknown_guids() {
    let h = harness().await;

    let feed_id = h
        .repo
        .create_feed(NewFeed {
            kind: FeedKind::Rss,
            url: "https://a.example/feed.xml".to_string(),
            author_id: None,
            title: "A".to_string(),
            description: None,
            category_id: None,
        })
        .await
        .unwrap()
        .unwrap();
    h.repo
        .insert_item(NewFeedItem {
            feed_id,
            guid: "guid-1".to_string(),
            title: "One".to_string(),
            content: None,
            url: "https://a.example/1".to_string(),
            author: None,
            published_at: chrono::Utc::now(),
            thumbnail: None,
            video_id: None,
        })
        .await
        .unwrap();

    store_subscriptions(&h, r#"{"rss": ["https://a.example/feed.xml"]}"#, 100);
    store_read_status(&h, r#"{"itemGuids": ["guid-1", "guid-never-fetched"]}"#, 100);

    h.engine.run_cycle().await.unwrap();

    let items = h.repo.get_all_items_sorted().await.unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].is_read);

    // Applying the same read set again never un-reads anything.
    h.engine.run_cycle().await.unwrap();
    let items = h.repo.get_all_items_sorted().await.unwrap();
    assert!(items[0].is_read);
}

#[tokio::test]
async fn push_publishes_merged_snapshots_for_both_kinds() {
    let h = harness().await;

    h.repo
        .create_feed(NewFeed {
            kind: FeedKind::Rss,
            url: "https://local.example/feed.xml".to_string(),
            author_id: None,
            title: "Local".to_string(),
            description: None,
            category_id: None,
        })
        .await
        .unwrap()
        .unwrap();
    store_subscriptions(&h, r#"{"rss": ["https://remote.example/feed.xml"]}"#, 100);

    let report = h.engine.push().await.unwrap();
    assert_eq!(report.subscription_relays, 1);
    assert_eq!(report.read_status_relays, 1);

    let published = h.transport.published();
    assert_eq!(published.len(), 2);

    let subs = published
        .iter()
        .find(|e| e.kind.as_u16() == SUBSCRIPTION_LIST_KIND)
        .expect("subscription record published");
    assert_eq!(subs.tags.identifier(), Some(SUBSCRIPTION_D_TAG));

    let snapshot = SubscriptionSnapshot::from_content(&subs.content).unwrap();
    assert!(snapshot.rss_urls.contains("https://local.example/feed.xml"));
    assert!(snapshot.rss_urls.contains("https://remote.example/feed.xml"));

    let reads = published
        .iter()
        .find(|e| e.kind.as_u16() == READ_STATUS_KIND)
        .expect("read-status record published");
    assert_eq!(reads.tags.identifier(), Some(READ_STATUS_D_TAG));
}

#[tokio::test]
async fn deleting_a_feed_tombstones_it_in_the_pushed_snapshot() {
    let h = harness().await;

    let feed_id = h
        .repo
        .create_feed(NewFeed {
            kind: FeedKind::Rss,
            url: "https://gone.example/feed.xml".to_string(),
            author_id: None,
            title: "Gone".to_string(),
            description: None,
            category_id: None,
        })
        .await
        .unwrap()
        .unwrap();
    h.repo.delete_feed(feed_id).await.unwrap();
    h.repo
        .record_feed_deletion("https://gone.example/feed.xml")
        .await
        .unwrap();

    h.engine.push().await.unwrap();

    let published = h.transport.published();
    let subs = published
        .iter()
        .find(|e| e.kind.as_u16() == SUBSCRIPTION_LIST_KIND)
        .unwrap();
    let snapshot = SubscriptionSnapshot::from_content(&subs.content).unwrap();

    // The tombstone rides along, but nothing prunes the URL from a remote
    // list that still carries it.
    assert!(snapshot.deleted_feeds.contains("https://gone.example/feed.xml"));
    assert!(!snapshot.rss_urls.contains("https://gone.example/feed.xml"));
}
