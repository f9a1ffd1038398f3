pub mod memory;
pub mod postgres;

pub use memory::MemoryFeedStore;
pub use postgres::PgFeedStore;
