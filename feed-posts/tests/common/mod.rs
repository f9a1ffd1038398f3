#![allow(dead_code)]

pub mod http;

use async_trait::async_trait;
use feed_posts::types::{Cursor, FeedIdentifier, FeedPage, FeedState, IngestConfig, IngestError, RawItem, Result};
use feed_posts::{FeedSource, FeedStore, MemoryFeedStore};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Fast settings so dispatcher tests finish quickly.
pub fn test_config(workers: usize) -> IngestConfig {
    IngestConfig {
        workers,
        rate_per_second: 1000,
        queue_capacity: workers,
        page_limit: 100,
        invalid_cursor_pattern: Some("null".to_string()),
    }
}

pub fn feed(name: &str) -> FeedIdentifier {
    FeedIdentifier::from_parts("did:plc:test", &format!("app.bsky.feed.generator/{}", name))
}

pub fn post_uri(id: &str) -> String {
    format!("at://did:plc:author/app.bsky.feed.post/{}", id)
}

pub fn item(id: &str) -> RawItem {
    let uri = post_uri(id);
    RawItem {
        content_id: uri.clone(),
        payload: json!({ "post": { "uri": uri, "record": { "text": format!("post {}", id) } } }),
    }
}

pub fn page(cursor: Option<&str>, ids: &[&str]) -> FeedPage {
    FeedPage {
        cursor: cursor.map(Cursor::new),
        items: ids.iter().map(|id| item(id)).collect(),
    }
}

/// Remote feeds keyed by (feed, requested cursor), so repeated runs replay
/// the same responses the way a real server would.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<HashMap<(FeedIdentifier, Option<String>), FeedPage>>,
    calls: Mutex<HashMap<FeedIdentifier, Vec<Option<String>>>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Register the page returned when `feed` is requested at `at_cursor`.
    pub fn add_page(&self, feed: &FeedIdentifier, at_cursor: Option<&str>, response: FeedPage) {
        self.pages
            .lock()
            .unwrap()
            .insert((feed.clone(), at_cursor.map(str::to_string)), response);
    }

    /// Register a linear chain: page i is served at the cursor returned by page i-1.
    pub fn add_chain(&self, feed: &FeedIdentifier, pages: Vec<FeedPage>) {
        let mut at: Option<String> = None;
        for response in pages {
            let next = response.cursor.as_ref().map(|c| c.as_str().to_string());
            self.add_page(feed, at.as_deref(), response);
            at = next;
        }
    }

    pub fn calls_for(&self, feed: &FeedIdentifier) -> Vec<Option<String>> {
        self.calls.lock().unwrap().get(feed).cloned().unwrap_or_default()
    }

    pub fn call_count(&self, feed: &FeedIdentifier) -> usize {
        self.calls_for(feed).len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn get_feed(&self, identifier: &FeedIdentifier, cursor: Option<&Cursor>, _limit: u32) -> Result<FeedPage> {
        let at = cursor.map(|c| c.as_str().to_string());
        self.calls
            .lock()
            .unwrap()
            .entry(identifier.clone())
            .or_default()
            .push(at.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let response = self.pages.lock().unwrap().get(&(identifier.clone(), at.clone())).cloned();
        response.ok_or_else(|| IngestError::Api {
            status: 400,
            message: format!("no page for {} at cursor {:?}", identifier, at),
        })
    }
}

/// Memory store whose `fail_on`-th commit for one feed is rejected.
pub struct FailingStore {
    pub inner: MemoryFeedStore,
    feed: FeedIdentifier,
    fail_on: usize,
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: MemoryFeedStore, feed: FeedIdentifier, fail_on: usize) -> Self {
        Self {
            inner,
            feed,
            fail_on,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FeedStore for FailingStore {
    async fn load_state(&self, identifier: &FeedIdentifier) -> Result<FeedState> {
        self.inner.load_state(identifier).await
    }

    async fn commit_page(&self, identifier: &FeedIdentifier, state: &FeedState, new_items: &[RawItem]) -> Result<()> {
        if identifier == &self.feed {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt == self.fail_on {
                return Err(IngestError::Database(sqlx::Error::Protocol(format!("commit {} rejected", attempt))));
            }
        }
        self.inner.commit_page(identifier, state, new_items).await
    }
}
