pub mod config;
pub mod dedup;
pub mod dispatcher;
pub mod fetcher;
pub mod input;
pub mod pagination;
pub mod pipeline;
pub mod rate_limit;
pub mod session;
pub mod store;
pub mod traits;
pub mod types;

pub use config::{Cli, Credentials};
pub use dispatcher::Dispatcher;
pub use fetcher::XrpcFeedClient;
pub use pipeline::FeedPipeline;
pub use session::XrpcSession;
pub use store::{MemoryFeedStore, PgFeedStore};
pub use traits::{FeedSource, FeedStore};
pub use types::*;
