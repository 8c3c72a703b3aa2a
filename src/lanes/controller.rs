use std::fmt;

use crate::provider::{Item, Page, ProviderError, SortMode, TopicId};
use crate::settings::AppSettings;

// ============================================================================
// Identifiers and Phases
// ============================================================================

/// Registry-unique id of one lane instance.
///
/// Removing a topic and adding it again yields a new `LaneId`, so results
/// addressed to the old instance can never land in the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaneId(pub(crate) u64);

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lane#{}", self.0)
    }
}

/// Fetch status of a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanePhase {
    /// Created, nothing requested yet.
    Idle,
    /// First page (or a full reload) in flight.
    Loading,
    /// Next page in flight; existing items stay visible.
    LoadingMore,
    Ready,
    Error,
}

impl LanePhase {
    /// True while a request for the lane is in flight.
    pub fn is_fetching(self) -> bool {
        matches!(self, Self::Loading | Self::LoadingMore)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::LoadingMore => "loading-more",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

/// Whether a request replaces the lane's items or appends to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Reload,
    More,
}

/// Everything needed to perform one fetch on behalf of a lane.
///
/// The `generation` must be handed back to [`LaneController::apply`] with
/// the result; only the newest generation is ever applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub lane_id: LaneId,
    pub topic: TopicId,
    pub sort: SortMode,
    pub continuation: Option<String>,
    pub generation: u64,
    pub kind: FetchKind,
}

/// Result of handing a response to a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// A newer request was issued since this one; the response was dropped.
    Stale,
}

// ============================================================================
// LaneController
// ============================================================================

/// State machine for one lane.
///
/// ```text
/// Idle ──load──▶ Loading ──▶ Ready | Error
/// Ready ──load_more──▶ LoadingMore ──▶ Ready | Error
/// any ──refresh / change_sort──▶ Loading
/// ```
///
/// The controller performs no I/O. Every transition that needs the network
/// returns a [`FetchRequest`]; the caller runs it and feeds the outcome back
/// through [`apply`](Self::apply). Each request bumps the lane's generation,
/// so at most one request per lane is ever live.
#[derive(Debug, Clone)]
pub struct LaneController {
    id: LaneId,
    topic: TopicId,
    sort: SortMode,
    items: Vec<Item>,
    continuation_token: Option<String>,
    phase: LanePhase,
    last_error: Option<String>,
    generation: u64,
}

impl LaneController {
    pub fn new(id: LaneId, topic: TopicId) -> Self {
        Self {
            id,
            topic,
            sort: SortMode::default(),
            items: Vec::new(),
            continuation_token: None,
            phase: LanePhase::Idle,
            last_error: None,
            generation: 0,
        }
    }

    pub fn id(&self) -> LaneId {
        self.id
    }

    pub fn topic(&self) -> &TopicId {
        &self.topic
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    /// True when a further page can be requested.
    pub fn has_more(&self) -> bool {
        self.continuation_token.is_some()
    }

    pub fn phase(&self) -> LanePhase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Request the first page. Refused while a request is in flight.
    ///
    /// Existing items stay in place until the response arrives, so a failed
    /// reload keeps showing the previous content.
    pub fn load(&mut self) -> Option<FetchRequest> {
        if self.phase.is_fetching() {
            tracing::debug!(topic = %self.topic, phase = self.phase.name(), "Load ignored, fetch in flight");
            return None;
        }
        self.continuation_token = None;
        Some(self.start(FetchKind::Reload, None))
    }

    /// Reload from the first page, superseding any in-flight request.
    pub fn refresh(&mut self) -> FetchRequest {
        self.continuation_token = None;
        self.start(FetchKind::Reload, None)
    }

    /// Request the next page.
    ///
    /// Only valid in `Ready`. Returns `None` at end of feed (no continuation
    /// token); that is not an error.
    pub fn load_more(&mut self) -> Option<FetchRequest> {
        if self.phase != LanePhase::Ready {
            tracing::debug!(topic = %self.topic, phase = self.phase.name(), "Load more ignored, lane not ready");
            return None;
        }
        let token = self.continuation_token.clone()?;
        Some(self.start(FetchKind::More, Some(token)))
    }

    /// Switch sort order. Same sort is a no-op; otherwise the lane is
    /// emptied and reloaded.
    pub fn change_sort(&mut self, sort: SortMode) -> Option<FetchRequest> {
        if sort == self.sort {
            return None;
        }
        tracing::debug!(topic = %self.topic, from = %self.sort, to = %sort, "Changing sort");
        self.sort = sort;
        self.items.clear();
        self.continuation_token = None;
        Some(self.start(FetchKind::Reload, None))
    }

    /// Timer-driven reload. Fires only when auto-refresh is enabled and the
    /// lane is settled (`Ready` or `Error`); never interrupts a fetch.
    pub fn auto_refresh_tick(&mut self, settings: &AppSettings) -> Option<FetchRequest> {
        if !settings.auto_refresh {
            return None;
        }
        match self.phase {
            LanePhase::Ready | LanePhase::Error => Some(self.refresh()),
            _ => None,
        }
    }

    fn start(&mut self, kind: FetchKind, continuation: Option<String>) -> FetchRequest {
        self.generation = self.generation.wrapping_add(1);
        self.phase = match kind {
            FetchKind::Reload => LanePhase::Loading,
            FetchKind::More => LanePhase::LoadingMore,
        };
        self.last_error = None;

        FetchRequest {
            lane_id: self.id,
            topic: self.topic.clone(),
            sort: self.sort,
            continuation,
            generation: self.generation,
            kind,
        }
    }

    /// Apply the outcome of a request issued by this lane.
    ///
    /// Responses whose generation is not the lane's current one are dropped
    /// without touching any state.
    pub fn apply(&mut self, generation: u64, result: Result<Page, ProviderError>) -> ApplyOutcome {
        if self.is_stale(generation) {
            return ApplyOutcome::Stale;
        }

        match result {
            Ok(page) => {
                let count = page.items.len();
                if self.phase == LanePhase::LoadingMore {
                    self.items.extend(page.items);
                } else {
                    self.items = page.items;
                }
                self.continuation_token = page.continuation_token.filter(|t| !t.is_empty());
                self.phase = LanePhase::Ready;
                tracing::debug!(
                    topic = %self.topic,
                    added = count,
                    total = self.items.len(),
                    has_more = self.continuation_token.is_some(),
                    "Lane updated"
                );
            }
            Err(e) => {
                tracing::warn!(topic = %self.topic, error = %e, "Lane fetch failed");
                self.phase = LanePhase::Error;
                self.last_error = Some(e.to_string());
            }
        }
        ApplyOutcome::Applied
    }

    /// End the request for `generation` without a response, e.g. when the
    /// fetch task died. Same staleness rules and error state as a failed
    /// [`apply`](Self::apply).
    pub fn fail(&mut self, generation: u64, message: impl Into<String>) -> ApplyOutcome {
        if self.is_stale(generation) {
            return ApplyOutcome::Stale;
        }
        let message = message.into();
        tracing::warn!(topic = %self.topic, error = %message, "Lane fetch aborted");
        self.phase = LanePhase::Error;
        self.last_error = Some(message);
        ApplyOutcome::Applied
    }

    fn is_stale(&self, generation: u64) -> bool {
        let stale = generation != self.generation || !self.phase.is_fetching();
        if stale {
            tracing::debug!(
                topic = %self.topic,
                expected = self.generation,
                got = generation,
                "Ignoring stale page (generation mismatch)"
            );
        }
        stale
    }

    /// Items as they should be shown under the current display toggles.
    ///
    /// Hidden fields are masked on copies; the stored items keep everything
    /// so turning a toggle back on needs no refetch.
    pub fn display_items(&self, settings: &AppSettings) -> Vec<Item> {
        self.items
            .iter()
            .map(|item| {
                let mut item = item.clone();
                if !settings.show_thumbnails {
                    item.thumbnail_url = None;
                }
                if !settings.show_awards {
                    item.award_count = 0;
                }
                item
            })
            .collect()
    }
}
