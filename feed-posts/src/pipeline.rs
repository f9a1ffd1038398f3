use crate::dedup::dedup_page;
use crate::pagination::{next_cursor, CursorPredicate, CursorStep, CursorWindow};
use crate::traits::{FeedSource, FeedStore};
use crate::types::{Cursor, FeedIdentifier, FeedPage, FeedReport, IngestConfig, Result, StopReason};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Fetch, dedup and persist loop for a single feed.
///
/// Pages are strictly sequential: page N is committed before page N+1 is
/// requested. Any error ends the loop and is returned to the caller; state
/// committed for earlier pages stays committed.
pub struct FeedPipeline {
    source: Arc<dyn FeedSource>,
    store: Arc<dyn FeedStore>,
    page_limit: u32,
    invalid_cursor: CursorPredicate,
}

impl FeedPipeline {
    pub fn new(source: Arc<dyn FeedSource>, store: Arc<dyn FeedStore>, config: &IngestConfig) -> Self {
        Self {
            source,
            store,
            page_limit: config.page_limit,
            invalid_cursor: CursorPredicate::from(config.invalid_cursor_pattern.clone()),
        }
    }

    pub async fn process(&self, identifier: &FeedIdentifier) -> Result<FeedReport> {
        info!("Processing started for feed: {}", identifier);

        let mut state = self.store.load_state(identifier).await?;
        debug!("Loaded {} known post ids for {}", state.len(), identifier);

        let mut cursor: Option<Cursor> = None;
        let mut window = CursorWindow::new();
        let mut pages = 0;
        let mut new_total = 0;

        let stop = loop {
            let FeedPage { cursor: returned, items } = self
                .source
                .get_feed(identifier, cursor.as_ref(), self.page_limit)
                .await
                .map_err(|e| {
                    error!("Error fetching feed {}: {}", identifier, e);
                    e
                })?;
            pages += 1;

            if items.is_empty() && returned.is_some() {
                info!("Feed is empty: {}", identifier);
                break StopReason::EmptyFeed;
            }

            let fetched = items.len();
            let new_items = dedup_page(&mut state, items);

            if new_items.is_empty() && fetched > 0 {
                info!("No new posts found for feed: {}", identifier);
                break StopReason::CaughtUp;
            }

            self.store
                .commit_page(identifier, &state, &new_items)
                .await
                .map_err(|e| {
                    error!("Error saving page {} for feed {}: {}", pages, identifier, e);
                    e
                })?;
            new_total += new_items.len();

            debug!(
                "Feed {} page {}: {} fetched, {} new, {} known",
                identifier,
                pages,
                fetched,
                new_items.len(),
                state.len()
            );

            match next_cursor(returned, &mut window, &self.invalid_cursor) {
                CursorStep::Advance(next) => cursor = Some(next),
                CursorStep::Stop(reason) => break reason,
            }
        };

        info!(
            "Processing ended for feed: {} ({} pages, {} new posts, stopped: {})",
            identifier, pages, new_total, stop
        );

        Ok(FeedReport {
            identifier: identifier.clone(),
            pages,
            new_items: new_total,
            stop,
        })
    }
}
