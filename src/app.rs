use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nostr_sdk::EventBuilder;
use tokio::sync::mpsc;

use crate::config::{Config, SignerChoice};
use crate::db::Repository;
use crate::error::Result;
use crate::models::{ArticleFilter, Category, Feed, FeedItem, Tag};
use crate::nostr::{
    BusSigner, LocalKeySigner, RelayPool, RelayTransport, RemoteSigner, SignerBackend,
};
use crate::sync::{PushReport, SyncEngine, SyncError, SyncReport, SyncState};
use crate::tui::AppAction;

const BUS_APP_ID: &str = "feedstr";

/// Which pane the user is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Feeds,
    Articles,
    Reader,
}

/// How the left pane is organized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Feeds,
    Tags,
    Categories,
}

impl ViewMode {
    pub fn cycle(self) -> Self {
        match self {
            ViewMode::Feeds => ViewMode::Tags,
            ViewMode::Tags => ViewMode::Categories,
            ViewMode::Categories => ViewMode::Feeds,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ViewMode::Feeds => "Feeds",
            ViewMode::Tags => "Tags",
            ViewMode::Categories => "Categories",
        }
    }
}

/// Completion messages delivered back into the update loop.
pub enum TaskMessage {
    Connected(std::result::Result<(Arc<dyn SignerBackend>, Arc<RelayPool>), String>),
    SyncDone(std::result::Result<SyncReport, SyncError>),
    PushDone(std::result::Result<PushReport, SyncError>),
    RefreshDone { new_items: usize },
}

pub struct App {
    pub config: Config,
    pub repository: Repository,

    // Data
    pub feeds: Vec<Feed>,
    pub tags: Vec<Tag>,
    pub categories: Vec<Category>,
    pub articles: Vec<FeedItem>,
    pub unread_counts: HashMap<i64, i64>,

    // UI state (reads sync state, never writes it directly)
    pub view: View,
    pub view_mode: ViewMode,
    pub selected_feed: usize,
    pub selected_article: usize,
    pub filter: ArticleFilter,
    pub show_help: bool,
    pub status_message: String,
    pub reader_text: Option<String>,
    pub reader_scroll: u16,
    pub is_refreshing: bool,

    // Sync state machine
    pub sync_state: SyncState,
    engine: Option<SyncEngine>,
    transport: Option<Arc<RelayPool>>,
    last_sync: Option<Instant>,

    // Task completion channel
    message_rx: mpsc::Receiver<TaskMessage>,
    message_tx: mpsc::Sender<TaskMessage>,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;

        let feeds = repository.get_all_feeds().await?;
        let tags = repository.get_all_tags().await?;
        let categories = repository.list_categories().await?;
        let articles = repository.get_all_items_sorted().await?;
        let unread_counts = repository.unread_counts().await?;

        let (message_tx, message_rx) = mpsc::channel(16);

        let status_message = if config.identity.is_configured() {
            "Connecting...".to_string()
        } else {
            "No identity configured; edit the config and press 'c' to connect".to_string()
        };

        let mut app = Self {
            config: config.clone(),
            repository,
            feeds,
            tags,
            categories,
            articles,
            unread_counts,
            view: View::Feeds,
            view_mode: ViewMode::Feeds,
            selected_feed: 0,
            selected_article: 0,
            filter: ArticleFilter::default(),
            show_help: false,
            status_message,
            reader_text: None,
            reader_scroll: 0,
            is_refreshing: false,
            sync_state: SyncState::Unauthenticated,
            engine: None,
            transport: None,
            last_sync: None,
            message_rx,
            message_tx,
        };

        if app.config.identity.is_configured() {
            app.start_connect();
        }

        Ok(app)
    }

    // Connection / state machine

    fn start_connect(&mut self) {
        if self.sync_state == SyncState::Connecting {
            return;
        }
        self.sync_state = SyncState::Connecting;

        let config = self.config.clone();
        let tx = self.message_tx.clone();
        tokio::spawn(async move {
            let result = establish_session(&config).await;
            let _ = tx.send(TaskMessage::Connected(result)).await;
        });
    }

    /// Poll for completed background work (non-blocking).
    pub async fn poll_messages(&mut self) -> Result<()> {
        while let Ok(message) = self.message_rx.try_recv() {
            match message {
                TaskMessage::Connected(Ok((signer, pool))) => {
                    let transport: Arc<dyn RelayTransport> = pool.clone();
                    self.engine = Some(SyncEngine::new(
                        self.repository.clone(),
                        transport,
                        Some(signer),
                    ));
                    self.transport = Some(pool);
                    self.sync_state = SyncState::Authenticated;
                    self.status_message = "Connected! Syncing subscriptions...".to_string();
                    self.trigger_sync();
                }
                TaskMessage::Connected(Err(reason)) => {
                    self.sync_state = SyncState::AuthFailed(reason.clone());
                    self.status_message = format!("Connection failed: {reason}");
                }
                TaskMessage::SyncDone(result) => {
                    self.sync_state = SyncState::Authenticated;
                    self.last_sync = Some(Instant::now());
                    match result {
                        Ok(report) => {
                            self.status_message = report.summary();
                            self.reload_all().await?;
                        }
                        Err(e) => {
                            self.status_message = format!("Sync failed: {e}");
                        }
                    }
                }
                TaskMessage::PushDone(result) => {
                    self.sync_state = SyncState::Authenticated;
                    match result {
                        Ok(report) => {
                            self.status_message = format!(
                                "Published subscriptions to {} relays, read status to {}",
                                report.subscription_relays, report.read_status_relays
                            );
                        }
                        Err(e) => {
                            self.status_message = format!("Publish failed: {e}");
                        }
                    }
                }
                TaskMessage::RefreshDone { new_items } => {
                    self.is_refreshing = false;
                    self.status_message = format!("Refreshed feeds: {new_items} new articles");
                    self.reload_all().await?;
                }
            }
        }
        Ok(())
    }

    /// Kick off a cycle when the auto-sync interval has elapsed.
    pub fn maybe_auto_sync(&mut self) {
        if !self.sync_state.can_sync() {
            return;
        }
        let interval = Duration::from_secs(u64::from(self.config.sync_interval_minutes) * 60);
        if interval.is_zero() {
            return;
        }
        if self.last_sync.is_some_and(|t| t.elapsed() >= interval) {
            self.trigger_sync();
        }
    }

    fn trigger_sync(&mut self) {
        let Some(engine) = self.engine.clone() else {
            self.status_message = "Not connected".to_string();
            return;
        };
        // One cycle at a time; extra triggers are dropped, not queued.
        if self.sync_state == SyncState::Syncing {
            return;
        }
        self.sync_state = SyncState::Syncing;

        let tx = self.message_tx.clone();
        tokio::spawn(async move {
            let result = engine.run_cycle().await;
            let _ = tx.send(TaskMessage::SyncDone(result)).await;
        });
    }

    fn trigger_push(&mut self) {
        let Some(engine) = self.engine.clone() else {
            self.status_message = "Not connected".to_string();
            return;
        };
        if self.sync_state == SyncState::Syncing {
            return;
        }
        self.sync_state = SyncState::Syncing;
        self.status_message = "Publishing to relays...".to_string();

        let tx = self.message_tx.clone();
        tokio::spawn(async move {
            let result = engine.push().await;
            let _ = tx.send(TaskMessage::PushDone(result)).await;
        });
    }

    fn trigger_refresh(&mut self) {
        let Some(engine) = self.engine.clone() else {
            self.status_message = "Not connected".to_string();
            return;
        };
        if self.is_refreshing {
            return;
        }
        self.is_refreshing = true;
        self.status_message = "Refreshing feeds...".to_string();

        let fetcher = engine.fetcher();
        let repo = self.repository.clone();
        let feeds = self.feeds.clone();
        let tx = self.message_tx.clone();
        tokio::spawn(async move {
            let mut new_items = 0usize;
            for (feed_id, items) in fetcher.refresh_all(feeds).await {
                for item in items {
                    match repo.insert_item(item).await {
                        Ok(true) => new_items += 1,
                        Ok(false) => {}
                        Err(e) => tracing::warn!("Failed to store article: {}", e),
                    }
                }
                if let Err(e) = repo.update_feed_last_fetched(feed_id).await {
                    tracing::warn!("Failed to stamp feed {}: {}", feed_id, e);
                }
            }
            let _ = tx.send(TaskMessage::RefreshDone { new_items }).await;
        });
    }

    // Headless entry points

    /// Connect and run one sync cycle, for `--sync`.
    pub async fn sync_blocking(&mut self) -> Result<SyncReport> {
        let (signer, pool) = establish_session(&self.config)
            .await
            .map_err(crate::error::AppError::Config)?;
        let transport: Arc<dyn RelayTransport> = pool;
        let engine = SyncEngine::new(self.repository.clone(), transport, Some(signer));
        let report = engine.run_cycle().await?;
        Ok(report)
    }

    /// Connect and refresh every feed, for `--refresh`.
    pub async fn refresh_blocking(&mut self) -> Result<usize> {
        let (_, pool) = establish_session(&self.config)
            .await
            .map_err(crate::error::AppError::Config)?;
        let transport: Arc<dyn RelayTransport> = pool;
        let engine = SyncEngine::new(self.repository.clone(), transport, None);

        let mut new_items = 0usize;
        for (feed_id, items) in engine.fetcher().refresh_all(self.feeds.clone()).await {
            for item in items {
                if self.repository.insert_item(item).await? {
                    new_items += 1;
                }
            }
            self.repository.update_feed_last_fetched(feed_id).await?;
        }
        Ok(new_items)
    }

    // Selection helpers

    /// Number of rows in the left pane under the current view mode.
    pub fn left_pane_len(&self) -> usize {
        match self.view_mode {
            ViewMode::Feeds => self.feeds.len(),
            ViewMode::Tags => self.tags.len(),
            ViewMode::Categories => self.categories.len(),
        }
    }

    pub fn filtered_articles(&self) -> Vec<&FeedItem> {
        self.articles
            .iter()
            .filter(|a| match self.filter {
                ArticleFilter::All => true,
                ArticleFilter::Unread => !a.is_read,
                ArticleFilter::Favorites => a.is_favorite,
            })
            .collect()
    }

    pub fn selected_article(&self) -> Option<&FeedItem> {
        let articles = self.filtered_articles();
        articles.get(self.selected_article).copied()
    }

    // Actions

    pub async fn handle_action(&mut self, action: AppAction) -> Result<bool> {
        match action {
            AppAction::Quit => {
                if let Some(pool) = &self.transport {
                    pool.disconnect().await;
                }
                return Ok(true);
            }

            AppAction::MoveUp => self.move_selection(-1),
            AppAction::MoveDown => self.move_selection(1),

            AppAction::Select => self.select_current().await?,

            AppAction::Back => match self.view {
                View::Reader => {
                    self.view = View::Articles;
                    self.reader_text = None;
                    self.reader_scroll = 0;
                }
                View::Articles => {
                    self.view = View::Feeds;
                }
                View::Feeds => {}
            },

            AppAction::Sync => {
                if self.sync_state.can_sync() {
                    self.status_message = "Syncing...".to_string();
                    self.trigger_sync();
                } else {
                    self.status_message = "Cannot sync: not connected".to_string();
                }
            }

            AppAction::Push => {
                if self.sync_state.can_sync() {
                    self.trigger_push();
                } else {
                    self.status_message = "Cannot publish: not connected".to_string();
                }
            }

            AppAction::RefreshFeeds => self.trigger_refresh(),

            AppAction::Reconnect => {
                if matches!(
                    self.sync_state,
                    SyncState::Unauthenticated | SyncState::AuthFailed(_)
                ) {
                    self.sync_state = SyncState::Unauthenticated;
                    self.start_connect();
                }
            }

            AppAction::ToggleRead => {
                if let Some(article) = self.selected_article() {
                    let id = article.id;
                    let new_state = !article.is_read;
                    self.repository.mark_item_read(id, new_state).await?;
                    self.reload_articles().await?;
                }
            }

            AppAction::ToggleFavorite => {
                if let Some(article) = self.selected_article() {
                    let id = article.id;
                    self.repository.toggle_item_favorite(id).await?;
                    self.reload_articles().await?;
                }
            }

            AppAction::OpenInBrowser => {
                if let Some(article) = self.selected_article() {
                    let url = article.url.clone();
                    let _ = open::that(&url);
                }
            }

            AppAction::CycleFilter => {
                self.filter = self.filter.cycle();
                self.selected_article = 0;
            }

            AppAction::CycleViewMode => {
                if self.view == View::Feeds {
                    self.view_mode = self.view_mode.cycle();
                    self.selected_feed = 0;
                }
            }

            AppAction::DeleteFeed => {
                if self.view == View::Feeds && self.view_mode == ViewMode::Feeds {
                    if let Some(feed) = self.feeds.get(self.selected_feed) {
                        let id = feed.id;
                        let identifier = feed.identifier().to_string();
                        self.repository.delete_feed(id).await?;
                        self.repository.record_feed_deletion(&identifier).await?;
                        self.status_message = format!("Removed {identifier}");
                        self.reload_all().await?;
                        if self.selected_feed >= self.feeds.len() && self.selected_feed > 0 {
                            self.selected_feed -= 1;
                        }
                    }
                }
            }

            AppAction::ShowHelp => self.show_help = true,
            AppAction::HideHelp => self.show_help = false,
        }

        Ok(false)
    }

    fn move_selection(&mut self, delta: i64) {
        match self.view {
            View::Feeds => {
                let len = self.left_pane_len();
                if len > 0 {
                    self.selected_feed = step(self.selected_feed, delta, len);
                }
            }
            View::Articles => {
                let len = self.filtered_articles().len();
                if len > 0 {
                    self.selected_article = step(self.selected_article, delta, len);
                }
            }
            View::Reader => {
                self.reader_scroll = if delta > 0 {
                    self.reader_scroll.saturating_add(1)
                } else {
                    self.reader_scroll.saturating_sub(1)
                };
            }
        }
    }

    async fn select_current(&mut self) -> Result<()> {
        match self.view {
            View::Feeds => {
                let feed_ids = match self.view_mode {
                    ViewMode::Feeds => self
                        .feeds
                        .get(self.selected_feed)
                        .map(|f| vec![f.id])
                        .unwrap_or_default(),
                    ViewMode::Tags => match self.tags.get(self.selected_feed) {
                        Some(tag) => self
                            .repository
                            .get_feeds_by_tag(tag.id)
                            .await?
                            .into_iter()
                            .map(|f| f.id)
                            .collect(),
                        None => Vec::new(),
                    },
                    ViewMode::Categories => match self.categories.get(self.selected_feed) {
                        Some(category) => self
                            .repository
                            .get_feeds_by_category(&category.id)
                            .await?
                            .into_iter()
                            .map(|f| f.id)
                            .collect(),
                        None => Vec::new(),
                    },
                };
                if feed_ids.is_empty() {
                    return Ok(());
                }
                self.articles = self.repository.get_items_for_feeds(feed_ids).await?;
                self.selected_article = 0;
                self.view = View::Articles;
            }
            View::Articles => {
                if let Some(article) = self.selected_article() {
                    let id = article.id;
                    let content = article.content.clone().unwrap_or_default();
                    self.repository.mark_item_read(id, true).await?;
                    self.reader_text = Some(render_content(&content));
                    self.reader_scroll = 0;
                    self.view = View::Reader;
                    self.reload_articles().await?;
                }
            }
            View::Reader => {}
        }
        Ok(())
    }

    async fn reload_articles(&mut self) -> Result<()> {
        self.articles = self.repository.get_all_items_sorted().await?;
        self.unread_counts = self.repository.unread_counts().await?;
        Ok(())
    }

    async fn reload_all(&mut self) -> Result<()> {
        self.feeds = self.repository.get_all_feeds().await?;
        self.tags = self.repository.get_all_tags().await?;
        self.categories = self.repository.list_categories().await?;
        self.reload_articles().await?;
        Ok(())
    }
}

fn step(index: usize, delta: i64, len: usize) -> usize {
    index.saturating_add_signed(delta as isize).min(len - 1)
}

/// Convert stored article content to readable text.
fn render_content(content: &str) -> String {
    if content.contains('<') {
        html2text::from_read(content.as_bytes(), 100).unwrap_or_else(|_| content.to_string())
    } else {
        content.to_string()
    }
}

/// Build the signing backend and relay pool described by the config, then
/// prove the signer works by signing a throwaway note (never published).
async fn establish_session(
    config: &Config,
) -> std::result::Result<(Arc<dyn SignerBackend>, Arc<RelayPool>), String> {
    let signer: Arc<dyn SignerBackend> = match config.identity.signer {
        SignerChoice::Local => {
            let nsec = config
                .identity
                .nsec
                .as_deref()
                .filter(|s| !s.is_empty())
                .ok_or("no private key configured")?;
            Arc::new(LocalKeySigner::from_secret(nsec).map_err(|e| e.to_string())?)
        }
        SignerChoice::Bus => {
            let path = config.identity.bus_socket_path();
            Arc::new(
                BusSigner::connect(&path, BUS_APP_ID)
                    .await
                    .map_err(|e| e.to_string())?,
            )
        }
        SignerChoice::Remote => {
            let url = config.identity.bunker_url.clone().unwrap_or_default();
            Arc::new(RemoteSigner::connect(&url).map_err(|e| e.to_string())?)
        }
    };

    let pool = RelayPool::connect(&config.relays)
        .await
        .map_err(|e| e.to_string())?;

    let unsigned = EventBuilder::text_note("feedstr connection test").build(signer.public_key());
    signer
        .sign_event(unsigned)
        .await
        .map_err(|e| format!("signer check failed: {e}"))?;

    Ok((signer, Arc::new(pool)))
}
