//! Search-as-you-type over topic names.
//!
//! Keystrokes restart a quiescence timer; only the query that survives the
//! timer reaches the provider, and only the newest search's result is kept.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::app::AppEvent;
use crate::provider::{ContentProvider, ProviderError, SearchResult, DEFAULT_SEARCH_LIMIT};
use crate::util::catch_task_panic;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
/// Trimmed queries shorter than this never reach the provider.
pub const DEFAULT_MIN_QUERY_LEN: usize = 2;

// ============================================================================
// Debouncer
// ============================================================================

/// A single cancellable delayed task.
///
/// Scheduling replaces (aborts) whatever was pending. Dropping the debouncer
/// aborts the pending task too.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `task` once `delay` passes without another `schedule` or `cancel`.
    pub fn schedule<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// SearchDebouncer
// ============================================================================

/// Debounced topic search with stale-result discard.
///
/// Every query change bumps the generation. The spawned search reports back
/// with the generation it was started under through
/// [`AppEvent::SearchCompleted`]; [`on_search_completed`](Self::on_search_completed)
/// drops anything older than the current one.
#[derive(Debug)]
pub struct SearchDebouncer {
    debouncer: Debouncer,
    generation: u64,
    min_len: usize,
    limit: u32,
    query: String,
    results: Vec<SearchResult>,
    last_error: Option<String>,
}

impl Default for SearchDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE, DEFAULT_MIN_QUERY_LEN, DEFAULT_SEARCH_LIMIT)
    }
}

impl SearchDebouncer {
    pub fn new(delay: Duration, min_len: usize, limit: u32) -> Self {
        Self {
            debouncer: Debouncer::new(delay),
            generation: 0,
            min_len,
            limit,
            query: String::new(),
            results: Vec::new(),
            last_error: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while a search is waiting on its timer or in flight.
    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Record a new query and restart the timer.
    ///
    /// Short queries cancel any pending search and clear the results without
    /// touching the network.
    pub fn on_query_change(
        &mut self,
        query: &str,
        provider: Arc<dyn ContentProvider>,
        tx: mpsc::Sender<AppEvent>,
    ) {
        self.generation = self.generation.wrapping_add(1);
        self.query = query.to_string();

        let trimmed = query.trim().to_string();
        if trimmed.chars().count() < self.min_len {
            self.debouncer.cancel();
            self.results.clear();
            self.last_error = None;
            return;
        }

        let generation = self.generation;
        let limit = self.limit;
        self.debouncer.schedule(async move {
            tracing::debug!(query = %trimmed, generation, "Searching topics");
            let tx_panic = tx.clone();
            let outcome = catch_task_panic(async {
                let result = provider.search_topics(&trimmed, limit).await;
                if let Err(e) = tx
                    .send(AppEvent::SearchCompleted {
                        generation,
                        query: trimmed.clone(),
                        result,
                    })
                    .await
                {
                    tracing::warn!(error = %e, event = "SearchCompleted", "Channel send failed (receiver dropped)");
                }
            })
            .await;

            if let Err(panic_msg) = outcome {
                tracing::error!(task = "search", error = %panic_msg, "Background task panicked");
                let _ = tx_panic
                    .send(AppEvent::TaskPanicked {
                        task: "search",
                        error: panic_msg,
                    })
                    .await;
            }
        });
    }

    /// Apply a finished search. Returns `false` if it was superseded.
    pub fn on_search_completed(
        &mut self,
        generation: u64,
        result: Result<Vec<SearchResult>, ProviderError>,
    ) -> bool {
        if generation != self.generation {
            tracing::debug!(
                expected = self.generation,
                got = generation,
                "Ignoring stale search results"
            );
            return false;
        }

        match result {
            Ok(results) => {
                self.results = results;
                self.last_error = None;
            }
            Err(e) => {
                tracing::warn!(query = %self.query, error = %e, "Topic search failed");
                self.results.clear();
                self.last_error = Some(e.to_string());
            }
        }
        true
    }

    /// Forget the query, its results and any pending search.
    pub fn clear(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.debouncer.cancel();
        self.query.clear();
        self.results.clear();
        self.last_error = None;
    }
}
