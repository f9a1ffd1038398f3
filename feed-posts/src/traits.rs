use crate::types::{Cursor, FeedIdentifier, FeedPage, FeedState, RawItem, Result};
use async_trait::async_trait;

/// Remote source of paginated feed content.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch one page of `identifier`, starting at `cursor` (`None` for the first page).
    async fn get_feed(
        &self,
        identifier: &FeedIdentifier,
        cursor: Option<&Cursor>,
        limit: u32,
    ) -> Result<FeedPage>;
}

/// Durable per-feed dedup state plus the content relation.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Stored state for `identifier`, or an empty state if none exists yet.
    async fn load_state(&self, identifier: &FeedIdentifier) -> Result<FeedState>;

    /// Upsert `state` and insert `new_items` as one atomic unit.
    ///
    /// Inserting a content ID that already exists is a no-op. On error nothing
    /// from this call is visible.
    async fn commit_page(
        &self,
        identifier: &FeedIdentifier,
        state: &FeedState,
        new_items: &[RawItem],
    ) -> Result<()>;
}
