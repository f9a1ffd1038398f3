use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Names one remote feed, e.g. `at://did:plc:abc123/app.bsky.feed.generator/hot`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedIdentifier(String);

impl FeedIdentifier {
    pub const SCHEME: &'static str = "at";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Builds `at://<repository>/<record>` from the two halves of an input row.
    pub fn from_parts(repository: &str, record: &str) -> Self {
        Self(format!("{}://{}/{}", Self::SCHEME, repository, record))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-issued pagination token. Never parsed, only compared.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One fetched content record. `payload` is stored verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct RawItem {
    pub content_id: String,
    pub payload: Value,
}

/// Result of a single page request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedPage {
    pub cursor: Option<Cursor>,
    pub items: Vec<RawItem>,
}

// Stored shape of the per-feed metadata column. A missing or null list, or a
// null column, reads as empty.
#[derive(Clone, Serialize, Deserialize)]
struct StoredFeedState {
    #[serde(default)]
    post_uris: Option<Vec<String>>,
}

/// Every content ID ever seen for one feed, in arrival order.
///
/// The set only grows. `insert` is the only mutation and ignores IDs that are
/// already known, so the ordered list never holds duplicates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<StoredFeedState>", into = "StoredFeedState")]
pub struct FeedState {
    known_ids: Vec<String>,
    index: HashSet<String>,
}

impl FeedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, content_id: &str) -> bool {
        self.index.contains(content_id)
    }

    /// Records `content_id`, returning `true` if it was not known before.
    pub fn insert(&mut self, content_id: String) -> bool {
        if self.index.contains(&content_id) {
            return false;
        }
        self.index.insert(content_id.clone());
        self.known_ids.push(content_id);
        true
    }

    pub fn known_ids(&self) -> &[String] {
        &self.known_ids
    }

    pub fn len(&self) -> usize {
        self.known_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known_ids.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for FeedState {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut state = FeedState::new();
        for id in iter {
            state.insert(id.into());
        }
        state
    }
}

impl From<Option<StoredFeedState>> for FeedState {
    fn from(stored: Option<StoredFeedState>) -> Self {
        stored
            .and_then(|stored| stored.post_uris)
            .unwrap_or_default()
            .into_iter()
            .collect()
    }
}

impl From<FeedState> for StoredFeedState {
    fn from(state: FeedState) -> Self {
        Self {
            post_uris: Some(state.known_ids),
        }
    }
}
