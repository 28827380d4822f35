pub mod cache;
pub mod publisher;
pub mod store;

pub use cache::{HotCache, MemoryCache, RedisCache};
pub use publisher::Publisher;
pub use store::SnapshotStore;
