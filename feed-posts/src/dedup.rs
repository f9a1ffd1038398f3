use crate::types::{FeedState, RawItem};

/// Keep the items whose content ID is not yet in `state`, recording each one.
///
/// Arrival order is preserved, and a content ID repeated within the same page
/// is only kept the first time.
pub fn dedup_page(state: &mut FeedState, items: Vec<RawItem>) -> Vec<RawItem> {
    items
        .into_iter()
        .filter(|item| state.insert(item.content_id.clone()))
        .collect()
}
