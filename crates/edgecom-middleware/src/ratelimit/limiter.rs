use crate::chain::{Interceptor, Next, RequestContext};
use crate::status::Status;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::TokenBucket;

/// 全局限流器，所有调用方共享同一个令牌桶
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<TokenBucket>,
}

impl RateLimiter {
    /// `rate` 为每秒补充的令牌数，`burst` 为桶容量
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            bucket: Arc::new(TokenBucket::new(burst, rate)),
        }
    }

    /// 检查是否允许请求，允许时消耗一个令牌
    pub async fn allow(&self) -> bool {
        self.bucket.try_acquire(1.0).await
    }

    pub fn rate(&self) -> f64 {
        self.bucket.refill_rate()
    }

    pub fn burst(&self) -> f64 {
        self.bucket.capacity()
    }
}

/// 限流拦截器
pub struct RateLimitInterceptor {
    limiter: RateLimiter,
}

impl RateLimitInterceptor {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl<Req, Resp> Interceptor<Req, Resp> for RateLimitInterceptor
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn intercept(
        &self,
        ctx: RequestContext,
        req: Req,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp, Status> {
        if !self.limiter.allow().await {
            warn!(
                request_id = ctx.request_id(),
                method = %ctx.method,
                "Rate limit exceeded"
            );
            return Err(Status::resource_exhausted("rate limit exceeded"));
        }

        next.run(ctx, req).await
    }
}
