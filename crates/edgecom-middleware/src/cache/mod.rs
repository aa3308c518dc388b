// 响应缓存（LRU）
pub mod interceptor;
pub mod store;

pub use interceptor::{cache_key, CacheInterceptor};
pub use store::{ResponseCache, DEFAULT_CACHE_CAPACITY};
