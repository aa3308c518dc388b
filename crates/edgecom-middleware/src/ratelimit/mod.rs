pub mod limiter;
pub mod token_bucket;

pub use limiter::{RateLimitInterceptor, RateLimiter};
pub use token_bucket::TokenBucket;
