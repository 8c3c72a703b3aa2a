//! Remote content provider: the read-only listing and search API.
//!
//! - [`types`] - Normalized records (`Item`, `Page`, `SearchResult`) and ids
//! - [`client`] - reqwest-backed [`RedditClient`] and [`ProviderError`]
//!
//! Everything downstream of this module works with the normalized shapes
//! only. Raw remote JSON never leaves [`client`].

mod client;
#[cfg(test)]
pub(crate) mod fake;
mod types;

use async_trait::async_trait;

pub use client::{
    build_http_client, ProviderError, RedditClient, DEFAULT_PAGE_SIZE, DEFAULT_SEARCH_LIMIT,
};
pub use types::{Item, Page, SearchResult, SortMode, TopicId};

/// Read access to a source of topic listings.
///
/// Implementations must not retry on failure; retry policy belongs to the
/// caller. `continuation` of `None` or `Some("")` requests the first page.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn fetch_page(
        &self,
        topic: &TopicId,
        sort: SortMode,
        page_size: u32,
        continuation: Option<&str>,
    ) -> Result<Page, ProviderError>;

    /// Search topics by name. No matches yields an empty vec, not an error.
    async fn search_topics(&self, query: &str, limit: u32)
        -> Result<Vec<SearchResult>, ProviderError>;
}
