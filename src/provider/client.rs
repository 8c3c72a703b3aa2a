use super::types::{Item, Page, SearchResult, SortMode, TopicId};
use super::ContentProvider;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::redirect::Policy;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Page size used when the caller has no preference.
pub const DEFAULT_PAGE_SIZE: u32 = 25;
/// Number of search results requested when the caller has no preference.
pub const DEFAULT_SEARCH_LIMIT: u32 = 5;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const PERMALINK_BASE: &str = "https://reddit.com";

/// Errors returned by the content provider.
///
/// No variant is retried at this layer. Callers decide whether a failure
/// warrants another attempt.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network-level error (DNS, connection refused, TLS, etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,
    /// Listing request answered with a non-2xx status, or was redirected away
    /// from the topic (the provider does this for unknown topics)
    #[error("r/{topic} not found or is private (HTTP {status})")]
    NotFound { topic: TopicId, status: u16 },
    /// Search request answered with a non-2xx status
    #[error("topic search failed (HTTP {0})")]
    Search(u16),
    /// Response body exceeded the size limit
    #[error("response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Response body did not match the expected listing shape
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    /// The base URL cannot carry path segments (e.g. `mailto:`)
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl ProviderError {
    /// True for transport-class failures: the remote side never answered.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ============================================================================
// Raw Wire Schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    children: Vec<Thing<T>>,
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    upvote_ratio: f64,
    #[serde(default)]
    num_comments: i64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    selftext: Option<String>,
    #[serde(default)]
    is_self: bool,
    #[serde(default)]
    total_awards_received: Option<u64>,
    #[serde(default)]
    is_video: bool,
}

impl RawPost {
    fn into_item(self) -> Item {
        let permalink = absolute_permalink(&self.permalink);
        let body_text = if self.is_self {
            self.selftext.filter(|s| !s.trim().is_empty())
        } else {
            None
        };
        let upvote_ratio = if self.upvote_ratio.is_nan() {
            0.0
        } else {
            self.upvote_ratio.clamp(0.0, 1.0)
        };

        Item {
            id: self.id,
            title: self.title,
            author: self.author,
            score: self.score,
            upvote_ratio,
            num_comments: self.num_comments.max(0) as u64,
            created_at: self.created_utc as i64,
            permalink,
            url: self.url.filter(|u| !u.is_empty()),
            domain: self.domain,
            thumbnail_url: real_thumbnail(self.thumbnail),
            body_text,
            award_count: self.total_awards_received.unwrap_or(0),
            is_video: self.is_video,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTopic {
    display_name: String,
    #[serde(default)]
    subscribers: Option<u64>,
    #[serde(default)]
    public_description: Option<String>,
}

impl RawTopic {
    fn into_result(self) -> SearchResult {
        SearchResult {
            topic: TopicId::new(self.display_name),
            subscriber_count: self.subscribers.unwrap_or(0),
            description: self.public_description.unwrap_or_default(),
        }
    }
}

/// Listing permalinks are site-relative (`/r/rust/comments/...`).
fn absolute_permalink(permalink: &str) -> String {
    if permalink.starts_with("http://") || permalink.starts_with("https://") {
        permalink.to_string()
    } else {
        format!("{}{}", PERMALINK_BASE, permalink)
    }
}

/// The provider uses sentinel strings (`self`, `default`, `nsfw`, `spoiler`,
/// `image`, empty) in place of a missing thumbnail. Only real URLs survive.
fn real_thumbnail(thumbnail: Option<String>) -> Option<String> {
    thumbnail.filter(|t| t.starts_with("https://") || t.starts_with("http://"))
}

// ============================================================================
// HTTP Client
// ============================================================================

/// Create a redirect policy with loop detection and limited hops.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Build the shared `reqwest::Client` used for every provider request.
pub fn build_http_client(user_agent: &str) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .redirect(create_redirect_policy())
        .build()
}

/// Read-only client for the public listing and search endpoints.
///
/// Stateless apart from its configuration; cheap to clone.
#[derive(Debug, Clone)]
pub struct RedditClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl RedditClient {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/r/{topic}/{sort}.json?limit={n}&raw_json=1[&after={token}]`
    fn listing_url(
        &self,
        topic: &TopicId,
        sort: SortMode,
        page_size: u32,
        continuation: Option<&str>,
    ) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        let file = format!("{}.json", sort.as_str());
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["r", topic.as_str(), file.as_str()]);

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("limit", &page_size.max(1).to_string())
                .append_pair("raw_json", "1");
            if let Some(after) = continuation.filter(|t| !t.is_empty()) {
                query.append_pair("after", after);
            }
        }
        Ok(url)
    }

    /// `{base}/subreddits/search.json?q={query}&limit={n}&raw_json=1`
    fn search_url(&self, query: &str, limit: u32) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["subreddits", "search.json"]);
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("limit", &limit.max(1).to_string())
            .append_pair("raw_json", "1");
        Ok(url)
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response, ProviderError> {
        self.http
            .get(url)
            .send()
            .await
            .map_err(ProviderError::Network)
    }

    /// Run one request under the client deadline. The deadline spans the
    /// headers and the whole body read.
    async fn with_deadline<T, F>(&self, request: F) -> Result<T, ProviderError>
    where
        F: std::future::Future<Output = Result<T, ProviderError>>,
    {
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ProviderError::Timeout)?
    }

    async fn fetch_listing(
        &self,
        topic: &TopicId,
        sort: SortMode,
        page_size: u32,
        continuation: Option<&str>,
    ) -> Result<Page, ProviderError> {
        let url = self.listing_url(topic, sort, page_size, continuation)?;
        tracing::debug!(topic = %topic, sort = %sort, after = ?continuation, "Fetching listing page");

        let response = self.send(url).await?;
        let status = response.status();

        // Unknown topics are answered with a redirect to the search page
        // rather than a 404.
        if !status.is_success() || redirected_to_search(response.url()) {
            return Err(ProviderError::NotFound {
                topic: topic.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        let listing: Listing<RawPost> = serde_json::from_slice(&bytes)?;

        let items: Vec<Item> = listing
            .data
            .children
            .into_iter()
            .map(|thing| thing.data.into_item())
            .collect();
        let continuation_token = listing.data.after.filter(|t| !t.is_empty());

        tracing::debug!(
            topic = %topic,
            count = items.len(),
            has_more = continuation_token.is_some(),
            "Listing page fetched"
        );

        Ok(Page {
            items,
            continuation_token,
        })
    }

    async fn search_listing(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let url = self.search_url(query, limit)?;
        let response = self.send(url).await?;

        if !response.status().is_success() {
            return Err(ProviderError::Search(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        let listing: Listing<RawTopic> = serde_json::from_slice(&bytes)?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|thing| thing.data.into_result())
            .collect())
    }
}

#[async_trait]
impl ContentProvider for RedditClient {
    async fn fetch_page(
        &self,
        topic: &TopicId,
        sort: SortMode,
        page_size: u32,
        continuation: Option<&str>,
    ) -> Result<Page, ProviderError> {
        self.with_deadline(self.fetch_listing(topic, sort, page_size, continuation))
            .await
    }

    async fn search_topics(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        self.with_deadline(self.search_listing(query, limit)).await
    }
}

fn redirected_to_search(final_url: &Url) -> bool {
    final_url.path().starts_with("/subreddits/search")
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ProviderError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ProviderError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ProviderError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ProviderError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
