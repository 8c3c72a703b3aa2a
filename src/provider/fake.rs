//! Scripted in-process provider for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ContentProvider, Page, ProviderError, SearchResult, SortMode, TopicId};

type PageKey = (String, SortMode, Option<String>);

/// Answers from a fixed script. Unscripted pages are `NotFound` (404).
#[derive(Default)]
pub(crate) struct FakeProvider {
    pages: Mutex<HashMap<PageKey, Page>>,
    delays: Mutex<HashMap<(String, SortMode), Duration>>,
    fetch_calls: Mutex<Vec<PageKey>>,
    search_results: Mutex<HashMap<String, Vec<SearchResult>>>,
    search_calls: Mutex<Vec<String>>,
    fail_search: AtomicBool,
    panic_topics: Mutex<HashSet<String>>,
    panic_search: AtomicBool,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_page(&self, topic: &str, sort: SortMode, after: Option<&str>, page: Page) {
        self.pages
            .lock()
            .unwrap()
            .insert((topic.to_string(), sort, after.map(str::to_string)), page);
    }

    /// Responses for `(topic, sort)` arrive only after `delay`.
    pub(crate) fn set_delay(&self, topic: &str, sort: SortMode, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert((topic.to_string(), sort), delay);
    }

    pub(crate) fn set_search(&self, query: &str, results: Vec<SearchResult>) {
        self.search_results
            .lock()
            .unwrap()
            .insert(query.to_string(), results);
    }

    pub(crate) fn fail_searches(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    /// Fetches for `topic` panic instead of answering.
    pub(crate) fn panic_on_fetch(&self, topic: &str) {
        self.panic_topics.lock().unwrap().insert(topic.to_string());
    }

    pub(crate) fn panic_on_search(&self, panic: bool) {
        self.panic_search.store(panic, Ordering::SeqCst);
    }

    pub(crate) fn fetch_calls(&self) -> Vec<(String, SortMode, Option<String>)> {
        self.fetch_calls.lock().unwrap().clone()
    }

    pub(crate) fn search_calls(&self) -> Vec<String> {
        self.search_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentProvider for FakeProvider {
    async fn fetch_page(
        &self,
        topic: &TopicId,
        sort: SortMode,
        _page_size: u32,
        continuation: Option<&str>,
    ) -> Result<Page, ProviderError> {
        let key = (
            topic.as_str().to_string(),
            sort,
            continuation.filter(|t| !t.is_empty()).map(str::to_string),
        );
        self.fetch_calls.lock().unwrap().push(key.clone());

        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(&(key.0.clone(), sort))
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let panics = self.panic_topics.lock().unwrap().contains(&key.0);
        if panics {
            panic!("scripted fetch panic for r/{}", key.0);
        }

        let page = self.pages.lock().unwrap().get(&key).cloned();
        page.ok_or_else(|| ProviderError::NotFound {
            topic: topic.clone(),
            status: 404,
        })
    }

    async fn search_topics(
        &self,
        query: &str,
        _limit: u32,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        self.search_calls.lock().unwrap().push(query.to_string());
        if self.panic_search.load(Ordering::SeqCst) {
            panic!("scripted search panic");
        }
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(ProviderError::Search(503));
        }
        Ok(self
            .search_results
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default())
    }
}
