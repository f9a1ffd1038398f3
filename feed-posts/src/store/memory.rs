use crate::traits::FeedStore;
use crate::types::{FeedIdentifier, FeedState, RawItem, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    feeds: HashMap<FeedIdentifier, Value>,
    posts: HashMap<String, Value>,
    commits: usize,
}

/// In-process store with the same contract as [`super::PgFeedStore`].
///
/// State goes through the same JSON encoding as the database column, and a
/// commit applies under a single write lock so it is all-or-nothing.
#[derive(Clone, Default)]
pub struct MemoryFeedStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self, identifier: &FeedIdentifier) -> Option<FeedState> {
        let tables = self.tables.read().await;
        tables
            .feeds
            .get(identifier)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub async fn post(&self, content_id: &str) -> Option<Value> {
        self.tables.read().await.posts.get(content_id).cloned()
    }

    pub async fn feed_count(&self) -> usize {
        self.tables.read().await.feeds.len()
    }

    pub async fn post_count(&self) -> usize {
        self.tables.read().await.posts.len()
    }

    /// Number of successful `commit_page` calls.
    pub async fn commit_count(&self) -> usize {
        self.tables.read().await.commits
    }
}

#[async_trait]
impl FeedStore for MemoryFeedStore {
    async fn load_state(&self, identifier: &FeedIdentifier) -> Result<FeedState> {
        let tables = self.tables.read().await;
        match tables.feeds.get(identifier) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(FeedState::new()),
        }
    }

    async fn commit_page(
        &self,
        identifier: &FeedIdentifier,
        state: &FeedState,
        new_items: &[RawItem],
    ) -> Result<()> {
        let metadata = serde_json::to_value(state)?;

        let mut tables = self.tables.write().await;
        tables.feeds.insert(identifier.clone(), metadata);
        for item in new_items {
            tables
                .posts
                .entry(item.content_id.clone())
                .or_insert_with(|| item.payload.clone());
        }
        tables.commits += 1;
        Ok(())
    }
}
