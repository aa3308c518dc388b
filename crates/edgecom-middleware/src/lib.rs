//! 调用链中间件
//!
//! 拦截器按添加顺序由外到内执行：请求标识、限流、日志、指标、缓存，最后到达处理器。

pub mod cache;
pub mod chain;
pub mod logging;
pub mod metrics;
pub mod ratelimit;
pub mod request_id;
pub mod status;

pub use cache::{cache_key, CacheInterceptor, ResponseCache};
pub use chain::{
    handler_fn, ChainBuilder, FnHandler, Handler, Interceptor, InterceptorChain, Next,
    RequestContext,
};
pub use logging::LoggingInterceptor;
pub use metrics::{MetricsInterceptor, RequestMetrics};
pub use ratelimit::{RateLimitInterceptor, RateLimiter, TokenBucket};
pub use request_id::RequestIdInterceptor;
pub use status::{Code, Status};
