pub mod query_cache;

pub use query_cache::{CacheEvent, Query, QueryCache, QueryKey};
