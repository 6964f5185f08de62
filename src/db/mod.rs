//! Storage backends: PostgreSQL holds the offline tables, Redis the
//! similar-items cache. Both are optional at runtime.

pub mod postgres;
pub mod redis;

pub use postgres::create_pool;
pub use redis::{create_redis_client, Cache, CacheKey, CacheWriterHandle};
