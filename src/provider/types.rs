use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Topic Identifier
// ============================================================================

/// Identifier of a remote topic (a subreddit name such as `programming`).
///
/// Comparison is exact and case-sensitive: `Rust` and `rust` are distinct
/// lanes as far as the registry is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(String);

impl TopicId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TopicId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TopicId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TopicId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for TopicId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TopicId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ============================================================================
// Sort Mode
// ============================================================================

/// Listing order requested from the provider. Scoped to a single lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Hot,
    New,
    Top,
    Rising,
}

impl SortMode {
    pub const ALL: [SortMode; 4] = [Self::Hot, Self::New, Self::Top, Self::Rising];

    /// Path segment used by the listing endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::New => "new",
            Self::Top => "top",
            Self::Rising => "rising",
        }
    }

    /// Parse a sort name (case-insensitive).
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Some(Self::Hot),
            "new" => Some(Self::New),
            "top" => Some(Self::Top),
            "rising" => Some(Self::Rising),
            _ => None,
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Normalized Records
// ============================================================================

/// One post, normalized from the provider's listing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Provider-assigned id, stable and unique within a lane's list.
    pub id: String,
    pub title: String,
    pub author: String,
    /// Net score. Can be negative.
    pub score: i64,
    /// Fraction of upvotes, always within `[0.0, 1.0]`.
    pub upvote_ratio: f64,
    pub num_comments: u64,
    /// Unix epoch seconds.
    pub created_at: i64,
    /// Absolute URL of the discussion page.
    pub permalink: String,
    /// Link target. For self-posts this points back at the discussion.
    pub url: Option<String>,
    pub domain: String,
    pub thumbnail_url: Option<String>,
    /// Body of a self-post; `None` for link posts.
    pub body_text: Option<String>,
    pub award_count: u64,
    pub is_video: bool,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    /// Cursor for the next page. `None` marks the end of the listing.
    pub continuation_token: Option<String>,
}

impl Page {
    pub fn has_more(&self) -> bool {
        self.continuation_token.is_some()
    }
}

/// A topic returned by a name search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub topic: TopicId,
    pub subscriber_count: u64,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_mode_round_trips_names() {
        for sort in SortMode::ALL {
            assert_eq!(SortMode::from_str_name(sort.as_str()), Some(sort));
        }
        assert_eq!(SortMode::from_str_name("TOP"), Some(SortMode::Top));
        assert_eq!(SortMode::from_str_name("controversial"), None);
    }

    #[test]
    fn test_sort_mode_default_is_hot() {
        assert_eq!(SortMode::default(), SortMode::Hot);
    }

    #[test]
    fn test_topic_id_is_case_sensitive() {
        assert_ne!(TopicId::from("Rust"), TopicId::from("rust"));
        assert_eq!(TopicId::from("rust"), "rust");
    }

    #[test]
    fn test_topic_id_serializes_as_plain_string() {
        let topics = vec![TopicId::from("programming"), TopicId::from("rust")];
        let json = serde_json::to_string(&topics).unwrap();
        assert_eq!(json, r#"["programming","rust"]"#);
    }
}
