//! End-to-end lane lifecycle against a mock listing API.
//!
//! Each test starts its own wiremock server and an in-memory blob store, then
//! drives the public `App` surface: add, paginate, re-sort, remove, search.

use std::sync::Arc;
use std::time::Duration;

use lanefeed::app::{App, AppOptions, EventOutcome};
use lanefeed::lanes::LanePhase;
use lanefeed::provider::{build_http_client, RedditClient, SortMode, TopicId};
use lanefeed::store::{BlobStore, FileStore, MemoryStore, LANES_KEY};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn post(id: &str) -> Value {
    json!({
        "kind": "t3",
        "data": {
            "id": id,
            "title": format!("Post {id}"),
            "author": "poster",
            "score": 42,
            "upvote_ratio": 0.95,
            "num_comments": 7,
            "created_utc": 1_700_000_000.0,
            "permalink": format!("/r/test/comments/{id}/post/"),
            "url": "https://example.com/article",
            "domain": "example.com",
            "thumbnail": "default",
            "is_self": false,
            "total_awards_received": 0
        }
    })
}

fn listing(ids: &[String], after: Option<&str>) -> Value {
    let children: Vec<Value> = ids.iter().map(|id| post(id)).collect();
    json!({ "kind": "Listing", "data": { "children": children, "after": after } })
}

fn numbered(prefix: &str, range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("{prefix}{i}")).collect()
}

fn app_for(server: &MockServer, store: Arc<dyn BlobStore>) -> App {
    let http = build_http_client("lanefeed-tests/1.0").unwrap();
    let client = RedditClient::new(http, Url::parse(&server.uri()).unwrap());
    App::new(Arc::new(client), store, AppOptions::default())
}

fn item_ids(app: &App, topic: &str) -> Vec<String> {
    app.lane(&TopicId::from(topic))
        .unwrap()
        .items()
        .iter()
        .map(|i| i.id.clone())
        .collect()
}

// ============================================================================
// Add + Paginate
// ============================================================================

#[tokio::test]
async fn test_add_then_paginate_to_end_of_feed() {
    let server = MockServer::start().await;
    let first = numbered("a", 0..25);
    let second = numbered("b", 0..10);

    Mock::given(method("GET"))
        .and(path("/r/programming/hot.json"))
        .and(query_param_is_missing("after"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&first, Some("t3_a"))))
        // existence probe + initial load
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/programming/hot.json"))
        .and(query_param("after", "t3_a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&second, Some(""))))
        .expect(1)
        .mount(&server)
        .await;

    let mut app = app_for(&server, Arc::new(MemoryStore::new()));
    let topic = TopicId::from("programming");
    app.add_topic("programming").await.unwrap();
    assert_eq!(app.lane(&topic).unwrap().phase(), LanePhase::Loading);
    assert!(app.lane(&topic).unwrap().items().is_empty());
    app.settle().await;

    assert_eq!(app.lane(&topic).unwrap().phase(), LanePhase::Ready);
    assert_eq!(item_ids(&app, "programming"), first);
    assert!(app.lane(&topic).unwrap().has_more());

    assert!(app.load_more(&topic));
    assert_eq!(app.lane(&topic).unwrap().phase(), LanePhase::LoadingMore);
    app.settle().await;

    let mut expected = first.clone();
    expected.extend(second);
    assert_eq!(item_ids(&app, "programming"), expected);
    assert_eq!(app.lane(&topic).unwrap().continuation_token(), None);

    // End of feed: no further request
    assert!(!app.load_more(&topic));
}

#[tokio::test]
async fn test_duplicate_add_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r/foo/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[], None)))
        .expect(2)
        .mount(&server)
        .await;

    let mut app = app_for(&server, Arc::new(MemoryStore::new()));
    app.add_topic("foo").await.unwrap();
    app.settle().await;

    let err = app.add_topic("foo").await.unwrap_err();
    assert!(err.is_duplicate());
    assert_eq!(err.to_string(), "r/foo is already open");
    assert_eq!(app.topics(), &[TopicId::from("foo")]);
}

#[tokio::test]
async fn test_inaccessible_topic_creates_no_lane() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r/privatesub/hot.json"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let mut app = app_for(&server, store.clone());

    let err = app.add_topic("privatesub").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(app.topics().is_empty());
    assert_eq!(store.read(LANES_KEY).unwrap(), None);
}

// ============================================================================
// Sorting and Refresh
// ============================================================================

#[tokio::test]
async fn test_sort_change_supersedes_slow_refresh() {
    let server = MockServer::start().await;
    let hot = numbered("hot", 0..3);
    let new = numbered("new", 0..2);

    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&hot, None)))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing(&numbered("late", 0..1), None))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/rust/new.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&new, None)))
        .expect(1)
        .mount(&server)
        .await;

    let mut app = app_for(&server, Arc::new(MemoryStore::new()));
    app.add_topic("rust").await.unwrap();
    app.settle().await;
    assert_eq!(item_ids(&app, "rust"), hot);

    let topic = TopicId::from("rust");
    assert!(app.refresh(&topic));
    assert!(app.change_sort(&topic, SortMode::New));
    assert!(app.lane(&topic).unwrap().items().is_empty(), "sort change clears items");
    app.settle().await;

    tokio::time::sleep(Duration::from_millis(700)).await;
    app.process_pending();

    assert_eq!(item_ids(&app, "rust"), new);
    assert_eq!(app.lane(&topic).unwrap().sort(), SortMode::New);
}

#[tokio::test]
async fn test_failed_refresh_keeps_items() {
    let server = MockServer::start().await;
    let items = numbered("x", 0..4);

    Mock::given(method("GET"))
        .and(path("/r/golang/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&items, None)))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/golang/hot.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut app = app_for(&server, Arc::new(MemoryStore::new()));
    app.add_topic("golang").await.unwrap();
    app.settle().await;

    let topic = TopicId::from("golang");
    app.refresh(&topic);
    app.settle().await;

    let lane = app.lane(&topic).unwrap();
    assert_eq!(lane.phase(), LanePhase::Error);
    assert!(lane.last_error().is_some());
    assert_eq!(item_ids(&app, "golang"), items);
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_lane_order_survives_restart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(&[], None)))
        .mount(&server)
        .await;

    let dir = std::env::temp_dir().join("lanefeed_it_restart");
    std::fs::remove_dir_all(&dir).ok();
    {
        let store = Arc::new(FileStore::open(&dir).unwrap());
        let mut app = app_for(&server, store);
        for topic in ["zig", "rust", "ocaml"] {
            app.add_topic(topic).await.unwrap();
        }
        app.remove_topic(&TopicId::from("rust"));
        app.settle().await;
    }

    let store = Arc::new(FileStore::open(&dir).unwrap());
    let app = app_for(&server, store);
    assert_eq!(app.topics(), &[TopicId::from("zig"), TopicId::from("ocaml")]);

    std::fs::remove_dir_all(&dir).ok();
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_typing_burst_sends_one_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subreddits/search.json"))
        .and(query_param("q", "red"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "children": [
                    { "kind": "t5", "data": { "display_name": "reddit", "subscribers": 1200, "public_description": "Site news" } },
                    { "kind": "t5", "data": { "display_name": "redditdev", "subscribers": 80 } }
                ],
                "after": null
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut app = app_for(&server, Arc::new(MemoryStore::new()));
    for query in ["r", "re", "red"] {
        app.on_query_change(query);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(app.process_next().await, EventOutcome::SearchUpdated);
    let names: Vec<&str> = app.search_results().iter().map(|r| r.topic.as_str()).collect();
    assert_eq!(names, vec!["reddit", "redditdev"]);
    assert_eq!(app.search_results()[0].subscriber_count, 1200);
}
