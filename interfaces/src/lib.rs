pub mod defs;

pub use defs::{Cursor, FeedIdentifier, FeedPage, FeedState, RawItem};
