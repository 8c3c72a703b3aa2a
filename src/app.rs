use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::Config;
use crate::lanes::{
    ApplyOutcome, Carousel, FetchRequest, LaneController, LaneId, LaneRegistry, RegistryError,
    ViewportClass, Window, DEFAULT_NARROW_BREAKPOINT, DEFAULT_WINDOW_SIZE,
};
use crate::provider::{
    ContentProvider, Item, Page, ProviderError, SearchResult, SortMode, TopicId,
    DEFAULT_PAGE_SIZE, DEFAULT_SEARCH_LIMIT,
};
use crate::search::{SearchDebouncer, DEFAULT_DEBOUNCE, DEFAULT_MIN_QUERY_LEN};
use crate::settings::{AppSettings, SettingsPatch, SettingsStore, Theme};
use crate::store::{BlobStore, StorageError};
use crate::util::catch_task_panic;

/// Capacity of the background event channel.
const EVENT_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// Events
// ============================================================================

/// Events from background tasks
#[derive(Debug)]
pub enum AppEvent {
    /// A lane fetch finished.
    ///
    /// Fields:
    /// - `lane_id`: The lane instance that issued the request
    /// - `generation`: The lane's generation when the request was spawned
    /// - `result`: The page or the provider error
    PageLoaded {
        topic: TopicId,
        lane_id: LaneId,
        generation: u64,
        result: Result<Page, ProviderError>,
    },
    /// A lane's auto-refresh timer fired. `timer_generation` identifies the
    /// timer that sent it; ticks from a replaced timer are dropped.
    AutoRefreshTick {
        topic: TopicId,
        lane_id: LaneId,
        timer_generation: u64,
    },
    /// A debounced topic search finished.
    SearchCompleted {
        generation: u64,
        query: String,
        result: Result<Vec<SearchResult>, ProviderError>,
    },
    /// A lane fetch task panicked before reporting a page.
    FetchPanicked {
        topic: TopicId,
        lane_id: LaneId,
        generation: u64,
        error: String,
    },
    /// A background task panicked.
    TaskPanicked { task: &'static str, error: String },
}

/// What handling one event changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A response was applied to the lane.
    LaneUpdated(TopicId),
    /// An auto-refresh tick started a reload.
    RefreshStarted(TopicId),
    SearchUpdated,
    /// Stale, superseded, or addressed to a lane that no longer exists.
    Discarded,
    /// A background task died. For a fetch, its lane is now in `Error`.
    TaskFailed,
}

// ============================================================================
// Options
// ============================================================================

/// Tunables that shape an [`App`], usually taken from [`Config`].
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub page_size: u32,
    pub search_limit: u32,
    pub search_debounce: Duration,
    pub min_query_len: usize,
    pub lane_window: usize,
    pub narrow_breakpoint: u16,
    pub default_topics: Vec<TopicId>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            search_limit: DEFAULT_SEARCH_LIMIT,
            search_debounce: DEFAULT_DEBOUNCE,
            min_query_len: DEFAULT_MIN_QUERY_LEN,
            lane_window: DEFAULT_WINDOW_SIZE,
            narrow_breakpoint: DEFAULT_NARROW_BREAKPOINT,
            default_topics: Vec::new(),
        }
    }
}

impl From<&Config> for AppOptions {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.page_size,
            search_limit: config.search_limit,
            search_debounce: config.search_debounce(),
            min_query_len: config.min_query_len,
            lane_window: config.lane_window,
            narrow_breakpoint: config.narrow_breakpoint,
            default_topics: config.default_topics.clone(),
        }
    }
}

// ============================================================================
// Per-lane Tasks
// ============================================================================

/// Background work owned by one lane. Dropping it aborts everything.
#[derive(Default)]
struct LaneTasks {
    fetch: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the timer is replaced or cancelled. An aborted timer
    /// may already have queued a tick.
    timer_generation: u64,
}

impl LaneTasks {
    fn abort_fetch(&mut self) {
        if let Some(handle) = self.fetch.take() {
            handle.abort();
        }
    }

    fn abort_timer(&mut self) {
        self.timer_generation = self.timer_generation.wrapping_add(1);
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

impl Drop for LaneTasks {
    fn drop(&mut self) {
        self.abort_fetch();
        self.abort_timer();
    }
}

/// Spawn a background fetch for one lane request.
///
/// Sends `AppEvent::PageLoaded` on completion (success or failure), or
/// `AppEvent::FetchPanicked` if the fetch panics. The handle lets the caller
/// abort the fetch when a newer request supersedes it.
fn spawn_fetch(
    provider: Arc<dyn ContentProvider>,
    req: FetchRequest,
    page_size: u32,
    tx: mpsc::Sender<AppEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let tx_panic = tx.clone();
        let outcome = catch_task_panic(async {
            let result = provider
                .fetch_page(&req.topic, req.sort, page_size, req.continuation.as_deref())
                .await;
            if let Err(e) = tx
                .send(AppEvent::PageLoaded {
                    topic: req.topic.clone(),
                    lane_id: req.lane_id,
                    generation: req.generation,
                    result,
                })
                .await
            {
                tracing::warn!(error = %e, event = "PageLoaded", "Channel send failed (receiver dropped)");
            }
        })
        .await;

        if let Err(panic_msg) = outcome {
            tracing::error!(task = "fetch", topic = %req.topic, error = %panic_msg, "Background task panicked");
            let _ = tx_panic
                .send(AppEvent::FetchPanicked {
                    topic: req.topic.clone(),
                    lane_id: req.lane_id,
                    generation: req.generation,
                    error: panic_msg,
                })
                .await;
        }
    })
}

/// Spawn a periodic auto-refresh timer. The first tick fires one full
/// `period` after spawning.
fn spawn_refresh_timer(
    topic: TopicId,
    lane_id: LaneId,
    timer_generation: u64,
    period: Duration,
    tx: mpsc::Sender<AppEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let tick = AppEvent::AutoRefreshTick {
                topic: topic.clone(),
                lane_id,
                timer_generation,
            };
            if tx.send(tick).await.is_err() {
                break;
            }
        }
    })
}

// ============================================================================
// App
// ============================================================================

/// Top-level coordinator: the lane registry, shared settings, topic search
/// and carousel, plus the background tasks that feed them.
///
/// All state lives here and is only mutated through `&mut self`. Network
/// fetches and timers run as tokio tasks that report back as [`AppEvent`]s,
/// which are applied by [`handle_event`](Self::handle_event). Each lane has
/// at most one fetch task alive; issuing a new request aborts the previous
/// one, and the lane's generation check drops anything that still slips
/// through.
pub struct App {
    provider: Arc<dyn ContentProvider>,
    registry: LaneRegistry,
    settings: SettingsStore,
    search: SearchDebouncer,
    carousel: Carousel,
    viewport: ViewportClass,
    narrow_breakpoint: u16,
    page_size: u32,
    tasks: HashMap<TopicId, LaneTasks>,
    event_tx: mpsc::Sender<AppEvent>,
    event_rx: mpsc::Receiver<AppEvent>,
}

impl App {
    /// Restore lanes and settings from `store`. Nothing is fetched until
    /// [`start`](Self::start).
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        store: Arc<dyn BlobStore>,
        options: AppOptions,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let registry = LaneRegistry::load(store.clone(), &options.default_topics);
        let settings = SettingsStore::load(store);
        let mut carousel = Carousel::new(options.lane_window);
        carousel.clamp(registry.len());

        Self {
            provider,
            registry,
            settings,
            search: SearchDebouncer::new(
                options.search_debounce,
                options.min_query_len,
                options.search_limit,
            ),
            carousel,
            viewport: ViewportClass::Wide,
            narrow_breakpoint: options.narrow_breakpoint,
            page_size: options.page_size,
            tasks: HashMap::new(),
            event_tx,
            event_rx,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn registry(&self) -> &LaneRegistry {
        &self.registry
    }

    pub fn topics(&self) -> &[TopicId] {
        self.registry.list()
    }

    pub fn lane(&self, topic: &TopicId) -> Option<&LaneController> {
        self.registry.get(topic)
    }

    pub fn settings(&self) -> &AppSettings {
        self.settings.get()
    }

    pub fn search(&self) -> &SearchDebouncer {
        &self.search
    }

    pub fn search_results(&self) -> &[SearchResult] {
        self.search.results()
    }

    pub fn viewport(&self) -> ViewportClass {
        self.viewport
    }

    /// A lane's items with the current display toggles applied.
    pub fn display_items(&self, topic: &TopicId) -> Option<Vec<Item>> {
        self.registry
            .get(topic)
            .map(|lane| lane.display_items(self.settings.get()))
    }

    /// True while any lane has a request in flight.
    pub fn is_loading(&self) -> bool {
        self.registry.lanes().any(|lane| lane.phase().is_fetching())
    }

    // ========================================================================
    // Lane Operations
    // ========================================================================

    /// Load every lane and start auto-refresh timers if enabled.
    pub fn start(&mut self) {
        let topics = self.registry.list().to_vec();
        tracing::info!(lanes = topics.len(), "Starting lanes");
        for topic in &topics {
            self.load(topic);
        }
        self.reconcile_timers();
    }

    /// Open a new lane and start loading it.
    ///
    /// The topic is probed first; on any error no lane is created and the
    /// error is returned. A successful add also resets the topic search.
    pub async fn add_topic(&mut self, topic: impl Into<TopicId>) -> Result<(), RegistryError> {
        let topic = topic.into();
        self.registry
            .add(self.provider.as_ref(), topic.clone(), self.page_size)
            .await?;

        self.search.clear();
        self.load(&topic);
        self.reconcile_timer(&topic);
        Ok(())
    }

    /// Close a lane, aborting its fetch and timer. Returns false if the topic
    /// was not open.
    pub fn remove_topic(&mut self, topic: &TopicId) -> bool {
        // Dropping the tasks aborts them
        self.tasks.remove(topic);
        let removed = self.registry.remove(topic).is_some();
        self.carousel.clamp(self.registry.len());
        removed
    }

    /// Load the first page unless a request is already in flight.
    pub fn load(&mut self, topic: &TopicId) -> bool {
        let req = self.registry.get_mut(topic).and_then(LaneController::load);
        self.dispatch(req)
    }

    /// Reload from the first page, superseding any in-flight request.
    pub fn refresh(&mut self, topic: &TopicId) -> bool {
        let req = self.registry.get_mut(topic).map(LaneController::refresh);
        self.dispatch(req)
    }

    /// Fetch the next page. No-op at end of feed or while not `Ready`.
    pub fn load_more(&mut self, topic: &TopicId) -> bool {
        let req = self.registry.get_mut(topic).and_then(LaneController::load_more);
        self.dispatch(req)
    }

    pub fn change_sort(&mut self, topic: &TopicId, sort: SortMode) -> bool {
        let req = self
            .registry
            .get_mut(topic)
            .and_then(|lane| lane.change_sort(sort));
        self.dispatch(req)
    }

    fn dispatch(&mut self, req: Option<FetchRequest>) -> bool {
        let Some(req) = req else {
            return false;
        };
        tracing::debug!(
            topic = %req.topic,
            lane = %req.lane_id,
            generation = req.generation,
            sort = %req.sort,
            kind = ?req.kind,
            "Spawning lane fetch"
        );

        let tasks = self.tasks.entry(req.topic.clone()).or_default();
        tasks.abort_fetch();
        tasks.fetch = Some(spawn_fetch(
            self.provider.clone(),
            req,
            self.page_size,
            self.event_tx.clone(),
        ));
        true
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Apply a settings patch. Timers are restarted or cancelled when the
    /// auto-refresh toggle or period changes.
    pub fn update_settings(&mut self, patch: &SettingsPatch) -> Result<&AppSettings, StorageError> {
        let before = self.settings.get().clone();
        self.settings.update(patch)?;

        let after = self.settings.get();
        if before.auto_refresh != after.auto_refresh
            || before.refresh_interval() != after.refresh_interval()
        {
            self.reconcile_timers();
        }
        Ok(self.settings.get())
    }

    pub fn set_auto_refresh(&mut self, enabled: bool) -> Result<(), StorageError> {
        self.update_settings(&SettingsPatch {
            auto_refresh: Some(enabled),
            ..Default::default()
        })
        .map(|_| ())
    }

    pub fn toggle_theme(&mut self) -> Result<Theme, StorageError> {
        self.settings.toggle_theme()
    }

    fn reconcile_timers(&mut self) {
        let topics = self.registry.list().to_vec();
        for topic in &topics {
            self.reconcile_timer(topic);
        }
    }

    /// Restart (or cancel) one lane's timer to match the current settings.
    fn reconcile_timer(&mut self, topic: &TopicId) {
        let Some(lane_id) = self.registry.get(topic).map(LaneController::id) else {
            return;
        };
        let settings = self.settings.get();
        let enabled = settings.auto_refresh;
        let period = settings.refresh_interval();

        let tasks = self.tasks.entry(topic.clone()).or_default();
        tasks.abort_timer();
        if enabled {
            tracing::debug!(topic = %topic, period_ms = period.as_millis() as u64, "Auto-refresh timer started");
            tasks.timer = Some(spawn_refresh_timer(
                topic.clone(),
                lane_id,
                tasks.timer_generation,
                period,
                self.event_tx.clone(),
            ));
        }
    }

    // ========================================================================
    // Carousel
    // ========================================================================

    pub fn prev_lanes(&mut self) {
        self.carousel.prev();
    }

    pub fn next_lanes(&mut self) {
        self.carousel.next(self.registry.len());
    }

    /// Reclassify the viewport from a width in columns.
    pub fn set_viewport_width(&mut self, width: u16) {
        let viewport = ViewportClass::from_width(width, self.narrow_breakpoint);
        if viewport != self.viewport {
            tracing::debug!(width, ?viewport, "Viewport class changed");
        }
        self.viewport = viewport;
    }

    pub fn visible_lanes(&self) -> Window<'_> {
        self.carousel.visible(self.registry.list(), self.viewport)
    }

    // ========================================================================
    // Search
    // ========================================================================

    pub fn on_query_change(&mut self, query: &str) {
        self.search
            .on_query_change(query, self.provider.clone(), self.event_tx.clone());
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
    }

    // ========================================================================
    // Event Handling
    // ========================================================================

    /// Apply one background event.
    pub fn handle_event(&mut self, event: AppEvent) -> EventOutcome {
        match event {
            AppEvent::PageLoaded {
                topic,
                lane_id,
                generation,
                result,
            } => {
                let Some(lane) = self.registry.get_instance_mut(&topic, lane_id) else {
                    tracing::debug!(topic = %topic, lane = %lane_id, "Dropping page for closed lane");
                    return EventOutcome::Discarded;
                };
                match lane.apply(generation, result) {
                    ApplyOutcome::Applied => EventOutcome::LaneUpdated(topic),
                    ApplyOutcome::Stale => EventOutcome::Discarded,
                }
            }
            AppEvent::AutoRefreshTick {
                topic,
                lane_id,
                timer_generation,
            } => {
                let current = self.tasks.get(&topic).map(|t| t.timer_generation);
                if current != Some(timer_generation) {
                    tracing::debug!(topic = %topic, "Dropping tick from a replaced timer");
                    return EventOutcome::Discarded;
                }
                let settings = self.settings.get();
                let req = self
                    .registry
                    .get_instance_mut(&topic, lane_id)
                    .and_then(|lane| lane.auto_refresh_tick(settings));
                if self.dispatch(req) {
                    tracing::debug!(topic = %topic, "Auto-refresh");
                    EventOutcome::RefreshStarted(topic)
                } else {
                    EventOutcome::Discarded
                }
            }
            AppEvent::SearchCompleted {
                generation,
                query,
                result,
            } => {
                if self.search.on_search_completed(generation, result) {
                    tracing::debug!(query = %query, results = self.search.results().len(), "Search applied");
                    EventOutcome::SearchUpdated
                } else {
                    EventOutcome::Discarded
                }
            }
            AppEvent::FetchPanicked {
                topic,
                lane_id,
                generation,
                error,
            } => {
                tracing::error!(task = "fetch", topic = %topic, error = %error, "Background task panicked");
                if let Some(lane) = self.registry.get_instance_mut(&topic, lane_id) {
                    lane.fail(generation, format!("fetch task panicked: {error}"));
                }
                EventOutcome::TaskFailed
            }
            AppEvent::TaskPanicked { task, error } => {
                tracing::error!(task, error = %error, "Background task panicked");
                EventOutcome::TaskFailed
            }
        }
    }

    /// Wait for the next background event and apply it.
    pub async fn process_next(&mut self) -> EventOutcome {
        // The app holds a sender, so the channel never closes
        match self.event_rx.recv().await {
            Some(event) => self.handle_event(event),
            None => EventOutcome::Discarded,
        }
    }

    /// Apply every event already queued, without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Apply events until a search result lands. Returns false if a
    /// background task dies first.
    pub async fn wait_for_search(&mut self) -> bool {
        loop {
            match self.process_next().await {
                EventOutcome::SearchUpdated => return true,
                EventOutcome::TaskFailed => return false,
                _ => {}
            }
        }
    }

    /// Apply events until no lane has a request in flight.
    pub async fn settle(&mut self) {
        while self.is_loading() {
            self.process_next().await;
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .field("viewport", &self.viewport)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
