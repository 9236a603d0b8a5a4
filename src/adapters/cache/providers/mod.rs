//! Cache provider implementations

mod in_memory;
mod redis;

pub use in_memory::InMemoryCacheService;
pub use redis::RedisCacheService;
