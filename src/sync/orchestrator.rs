//! Sync cycle orchestration.
//!
//! One cycle: fetch the remote subscription snapshot, materialize any feeds,
//! tags and categories it references into the local cache, then apply remote
//! read state. Only the initial snapshot fetch is fatal; every later step is
//! best-effort per item and reported through counters.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nostr_sdk::prelude::*;

use crate::db::Repository;
use crate::feed::FeedFetcher;
use crate::models::{Category, FeedKind, NewFeed, SYNCED_CATEGORY_ID};
use crate::nostr::{RelayTransport, SignerBackend, TransportError};

use super::merge::{merge_read_status, merge_subscriptions};
use super::records::{
    CategoryInfo, ReadStatusSnapshot, SubscriptionSnapshot, CLIENT_TAG, READ_STATUS_D_TAG,
    READ_STATUS_KIND, SUBSCRIPTION_D_TAG, SUBSCRIPTION_LIST_KIND,
};
use super::SyncError;

const QUERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Placeholder description until the author's profile resolves.
const NOSTR_FEED_PLACEHOLDER: &str = "Nostr long-form content";

/// Outcome counters for one completed sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub feeds_added: usize,
    pub tags_imported: usize,
    pub categories_imported: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        *self == SyncReport::default()
    }

    /// One-line, human-readable outcome for the status bar.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "Synced! (No new data)".to_string();
        }
        let mut parts = Vec::new();
        if self.feeds_added > 0 {
            parts.push(format!("{} feeds", self.feeds_added));
        }
        if self.tags_imported > 0 {
            parts.push(format!("{} tags", self.tags_imported));
        }
        if self.categories_imported > 0 {
            parts.push(format!("{} categories", self.categories_imported));
        }
        format!("Synced! Added: {}", parts.join(", "))
    }
}

/// Per-kind relay acceptance counts for a push.
#[derive(Debug, Clone, Copy, Default)]
pub struct PushReport {
    pub subscription_relays: usize,
    pub read_status_relays: usize,
}

/// Stateful coordinator for one identity's synchronization.
///
/// Holds no cross-cycle state of its own; the local cache is the only thing
/// a cycle reads from or writes to besides the relay network.
#[derive(Clone)]
pub struct SyncEngine {
    repo: Repository,
    transport: Arc<dyn RelayTransport>,
    signer: Option<Arc<dyn SignerBackend>>,
    fetcher: Arc<FeedFetcher>,
}

impl SyncEngine {
    pub fn new(
        repo: Repository,
        transport: Arc<dyn RelayTransport>,
        signer: Option<Arc<dyn SignerBackend>>,
    ) -> Self {
        let fetcher = Arc::new(FeedFetcher::new(Arc::clone(&transport)));
        Self {
            repo,
            transport,
            signer,
            fetcher,
        }
    }

    pub fn fetcher(&self) -> Arc<FeedFetcher> {
        Arc::clone(&self.fetcher)
    }

    /// Run one synchronization cycle end to end.
    pub async fn run_cycle(&self) -> Result<SyncReport, SyncError> {
        let signer = self.signer.as_ref().ok_or(SyncError::NotAuthenticated)?;
        let pubkey = signer.public_key();

        // The one fatal step: without the subscription snapshot there is
        // nothing to reconcile. An absent snapshot is not an error.
        let Some(subs) = self.fetch_subscriptions(pubkey).await? else {
            return Ok(SyncReport::default());
        };

        tracing::debug!(
            "Sync received - rss: {}, nostr: {}, tagged feeds: {}, categorized feeds: {}",
            subs.rss_urls.len(),
            subs.nostr_authors.len(),
            subs.tag_assignments.len(),
            subs.category_assignments.len(),
        );

        let mut report = SyncReport::default();
        self.import_rss_feeds(&subs, &mut report).await;
        self.import_nostr_feeds(&subs, &mut report).await;
        self.import_tags(&subs, &mut report).await;
        self.import_categories(&subs, &mut report).await;
        self.apply_read_status(pubkey).await;

        Ok(report)
    }

    /// Publish the local state, merged with whatever the relays hold, back
    /// to the network.
    pub async fn push(&self) -> Result<PushReport, SyncError> {
        let signer = self.signer.as_ref().ok_or(SyncError::NotAuthenticated)?;
        let pubkey = signer.public_key();
        let mut report = PushReport::default();

        let local = self
            .build_subscription_snapshot()
            .await
            .map_err(|e| SyncError::Cache(e.to_string()))?;
        let remote = self.fetch_subscriptions(pubkey).await?;
        let merged = merge_subscriptions(Some(local), remote).unwrap_or_default();
        let content = merged.to_content()?;
        let accepted = self
            .publish_record(signer, pubkey, SUBSCRIPTION_LIST_KIND, SUBSCRIPTION_D_TAG, content)
            .await?;
        report.subscription_relays = accepted;

        let local = self
            .build_read_status_snapshot()
            .await
            .map_err(|e| SyncError::Cache(e.to_string()))?;
        let remote = self.fetch_read_status(pubkey).await?;
        let merged = merge_read_status(Some(local), remote).unwrap_or_default();
        let content = merged.to_content()?;
        let accepted = self
            .publish_record(signer, pubkey, READ_STATUS_KIND, READ_STATUS_D_TAG, content)
            .await?;
        report.read_status_relays = accepted;

        Ok(report)
    }

    // Snapshot retrieval

    async fn fetch_subscriptions(
        &self,
        pubkey: PublicKey,
    ) -> Result<Option<SubscriptionSnapshot>, SyncError> {
        let Some(event) = self
            .fetch_latest(pubkey, SUBSCRIPTION_LIST_KIND, SUBSCRIPTION_D_TAG)
            .await?
        else {
            return Ok(None);
        };
        match SubscriptionSnapshot::from_content(&event.content) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!("Discarding undecodable subscription snapshot: {}", e);
                Ok(None)
            }
        }
    }

    async fn fetch_read_status(
        &self,
        pubkey: PublicKey,
    ) -> Result<Option<ReadStatusSnapshot>, SyncError> {
        let Some(event) = self
            .fetch_latest(pubkey, READ_STATUS_KIND, READ_STATUS_D_TAG)
            .await?
        else {
            return Ok(None);
        };
        match ReadStatusSnapshot::from_content(&event.content) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                tracing::warn!("Discarding undecodable read-status snapshot: {}", e);
                Ok(None)
            }
        }
    }

    /// Query one replaceable slot. Relays can disagree on the current value,
    /// so the newest event wins.
    async fn fetch_latest(
        &self,
        pubkey: PublicKey,
        kind: u16,
        d_tag: &str,
    ) -> Result<Option<Event>, TransportError> {
        let filter = Filter::new()
            .author(pubkey)
            .kind(Kind::Custom(kind))
            .identifier(d_tag)
            .limit(1);
        let events = self.transport.query(filter, QUERY_TIMEOUT).await?;
        Ok(events.into_iter().max_by_key(|e| e.created_at))
    }

    // Cycle steps

    async fn import_rss_feeds(&self, subs: &SubscriptionSnapshot, report: &mut SyncReport) {
        for url in &subs.rss_urls {
            match self.repo.get_feed_by_url(url).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Feed lookup failed for {}: {}", url, e);
                    continue;
                }
            }

            let feed = NewFeed {
                kind: FeedKind::Rss,
                url: url.clone(),
                author_id: None,
                title: url.clone(),
                description: None,
                category_id: Some(SYNCED_CATEGORY_ID.to_string()),
            };

            match self.repo.create_feed(feed).await {
                Ok(Some(id)) => {
                    report.feeds_added += 1;
                    self.spawn_rss_metadata_refresh(id, url.clone());
                }
                // Lost a race with another writer; the row exists either way.
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to create feed {}: {}", url, e),
            }
        }
    }

    async fn import_nostr_feeds(&self, subs: &SubscriptionSnapshot, report: &mut SyncReport) {
        for npub in &subs.nostr_authors {
            let url = format!("nostr:{npub}");
            match self.repo.get_feed_by_url(&url).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Feed lookup failed for {}: {}", url, e);
                    continue;
                }
            }

            let feed = NewFeed {
                kind: FeedKind::Nostr,
                url: url.clone(),
                author_id: Some(npub.clone()),
                title: npub.clone(),
                description: Some(NOSTR_FEED_PLACEHOLDER.to_string()),
                category_id: Some(SYNCED_CATEGORY_ID.to_string()),
            };

            match self.repo.create_feed(feed).await {
                Ok(Some(id)) => {
                    report.feeds_added += 1;
                    self.spawn_profile_refresh(id, npub.clone());
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to create feed {}: {}", url, e),
            }
        }
    }

    async fn import_tags(&self, subs: &SubscriptionSnapshot, report: &mut SyncReport) {
        if subs.tag_assignments.is_empty() {
            return;
        }

        let names: HashSet<&String> = subs.tag_assignments.values().flatten().collect();

        // The counter tracks names processed, not rows created: re-importing
        // an existing tag still counts.
        let mut tag_ids: HashMap<&String, i64> = HashMap::new();
        for name in names {
            match self.repo.create_tag(name).await {
                Ok(id) => {
                    tag_ids.insert(name, id);
                }
                Err(e) => tracing::warn!("Failed to create tag {}: {}", name, e),
            }
            report.tags_imported += 1;
        }

        for (identifier, tags) in &subs.tag_assignments {
            // A tag may reference a feed the snapshot never listed; skip it.
            let feed = match self.repo.get_feed_by_url(identifier).await {
                Ok(Some(feed)) => feed,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Feed lookup failed for {}: {}", identifier, e);
                    continue;
                }
            };

            for name in tags {
                let Some(&tag_id) = tag_ids.get(name) else {
                    continue;
                };
                if let Err(e) = self.repo.link_feed_tag(feed.id, tag_id).await {
                    tracing::warn!("Failed to tag feed {}: {}", identifier, e);
                }
            }
        }
    }

    async fn import_categories(&self, subs: &SubscriptionSnapshot, report: &mut SyncReport) {
        for (identifier, info) in &subs.category_assignments {
            let feed = match self.repo.get_feed_by_url(identifier).await {
                Ok(Some(feed)) => feed,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Feed lookup failed for {}: {}", identifier, e);
                    continue;
                }
            };

            let category = match self.repo.get_category_by_name(&info.name).await {
                Ok(Some(category)) => category,
                Ok(None) => {
                    let category = Category {
                        id: format!("cat_{}", info.name),
                        name: info.name.clone(),
                        color: none_if_empty(&info.color),
                        icon: none_if_empty(&info.icon),
                        sort_order: 0,
                    };
                    if let Err(e) = self.repo.create_category(category.clone()).await {
                        tracing::warn!("Failed to create category {}: {}", info.name, e);
                        continue;
                    }
                    category
                }
                Err(e) => {
                    tracing::warn!("Category lookup failed for {}: {}", info.name, e);
                    continue;
                }
            };

            match self.repo.set_feed_category(feed.id, category.id).await {
                Ok(()) => report.categories_imported += 1,
                Err(e) => tracing::warn!("Failed to update feed category: {}", e),
            }
        }
    }

    async fn apply_read_status(&self, pubkey: PublicKey) {
        let status = match self.fetch_read_status(pubkey).await {
            Ok(Some(status)) => status,
            Ok(None) => return,
            Err(e) => {
                // Read state is nice-to-have; the cycle still completes.
                tracing::warn!("Failed to fetch read status: {}", e);
                return;
            }
        };

        for guid in &status.read_item_guids {
            // Unknown GUIDs are expected: the article may not be fetched yet.
            if let Err(e) = self.repo.mark_read_by_guid(guid).await {
                tracing::warn!("Failed to mark {} read: {}", guid, e);
            }
        }
    }

    // Background metadata refresh

    fn spawn_rss_metadata_refresh(&self, feed_id: i64, url: String) {
        let fetcher = Arc::clone(&self.fetcher);
        let repo = self.repo.clone();
        tokio::spawn(async move {
            match fetcher.fetch_rss_metadata(&url).await {
                Ok((title, description)) => {
                    if let Err(e) = repo.update_feed_metadata(feed_id, title, description).await {
                        tracing::warn!("Failed to store feed metadata for {}: {}", url, e);
                    }
                }
                Err(e) => tracing::warn!("Failed to fetch feed metadata for {}: {}", url, e),
            }
        });
    }

    fn spawn_profile_refresh(&self, feed_id: i64, npub: String) {
        let fetcher = Arc::clone(&self.fetcher);
        let repo = self.repo.clone();
        tokio::spawn(async move {
            match fetcher.fetch_profile(&npub).await {
                Ok(Some(profile)) => {
                    let title = profile.name.filter(|n| !n.is_empty());
                    let Some(title) = title else { return };
                    let about = profile.about.filter(|a| !a.is_empty());
                    if let Err(e) = repo.update_feed_metadata(feed_id, title, about).await {
                        tracing::warn!("Failed to store profile for {}: {}", npub, e);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to fetch profile for {}: {}", npub, e),
            }
        });
    }

    // Snapshot assembly from cache rows

    async fn build_subscription_snapshot(
        &self,
    ) -> crate::error::Result<SubscriptionSnapshot> {
        let feeds = self.repo.get_all_feeds().await?;
        let categories = self.repo.categories_by_id().await?;
        let tag_pairs = self.repo.feed_tag_pairs().await?;

        let mut snapshot = SubscriptionSnapshot {
            last_updated: Utc::now().timestamp(),
            ..SubscriptionSnapshot::default()
        };

        for feed in &feeds {
            match feed.kind {
                FeedKind::Rss => {
                    snapshot.rss_urls.insert(feed.url.clone());
                }
                FeedKind::Nostr => {
                    if let Some(npub) = &feed.author_id {
                        snapshot.nostr_authors.insert(npub.clone());
                    }
                }
            }

            // The synced bucket is a local holding area, not an assignment
            // worth propagating.
            if let Some(category_id) = feed
                .category_id
                .as_deref()
                .filter(|id| !id.is_empty() && *id != SYNCED_CATEGORY_ID)
            {
                if let Some(category) = categories.get(category_id) {
                    snapshot.category_assignments.insert(
                        feed.url.clone(),
                        CategoryInfo {
                            name: category.name.clone(),
                            color: category.color.clone().unwrap_or_default(),
                            icon: category.icon.clone().unwrap_or_default(),
                        },
                    );
                }
            }
        }

        for (identifier, tag) in tag_pairs {
            snapshot
                .tag_assignments
                .entry(identifier)
                .or_default()
                .insert(tag);
        }

        snapshot.deleted_feeds = self.repo.deleted_feed_identifiers().await?;

        Ok(snapshot)
    }

    async fn build_read_status_snapshot(&self) -> crate::error::Result<ReadStatusSnapshot> {
        let guids = self.repo.get_read_guids().await?;
        Ok(ReadStatusSnapshot {
            read_item_guids: guids.into_iter().collect(),
            last_updated: Utc::now().timestamp(),
        })
    }

    async fn publish_record(
        &self,
        signer: &Arc<dyn SignerBackend>,
        pubkey: PublicKey,
        kind: u16,
        d_tag: &str,
        content: String,
    ) -> Result<usize, SyncError> {
        let unsigned = EventBuilder::new(Kind::Custom(kind), content)
            .tags([
                Tag::identifier(d_tag),
                Tag::custom(TagKind::custom("client"), [CLIENT_TAG]),
            ])
            .build(pubkey);
        let event = signer.sign_event(unsigned).await?;
        let report = self.transport.publish(event).await?;
        tracing::debug!(
            "Published kind {} to {} relays ({} rejected)",
            kind,
            report.accepted,
            report.rejected
        );
        Ok(report.accepted)
    }
}

fn none_if_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
