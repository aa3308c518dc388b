use crate::chain::{Interceptor, Next, RequestContext};
use crate::status::Status;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{info, warn};

/// 日志拦截器：记录请求标识、方法、耗时与错误
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<Req, Resp> Interceptor<Req, Resp> for LoggingInterceptor
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
        let request_id = ctx.request_id().to_string();
        let method = ctx.method.clone();
        let start = Instant::now();

        let result = next.run(ctx, req).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(_) => info!(
                request_id = %request_id,
                method = %method,
                duration_ms = duration_ms,
                "Request completed"
            ),
            Err(status) => warn!(
                request_id = %request_id,
                method = %method,
                duration_ms = duration_ms,
                code = %status.code(),
                error = %status.message(),
                "Request failed"
            ),
        }

        result
    }
}
