use crate::chain::{Interceptor, Next, RequestContext};
use crate::status::Status;
use async_trait::async_trait;
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// 请求标识拦截器
///
/// 为每次调用生成 UUID v4，写入上下文，并将后续链路包在携带该标识的 span 中。
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestIdInterceptor;

impl RequestIdInterceptor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl<Req, Resp> Interceptor<Req, Resp> for RequestIdInterceptor
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn intercept(
        &self,
        mut ctx: RequestContext,
        req: Req,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp, Status> {
        let request_id = Uuid::new_v4().to_string();
        let span = info_span!("request", request_id = %request_id, method = %ctx.method);
        ctx.request_id = Some(request_id);

        next.run(ctx, req).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;
    use crate::chain::{handler_fn, ChainBuilder};

    #[tokio::test]
    async fn test_request_id_is_generated_per_call() {
        let chain = ChainBuilder::new()
            .with(RequestIdInterceptor::new())
            .build(handler_fn(|ctx: RequestContext, _req: ()| async move {
                ctx.request_id
                    .ok_or_else(|| Status::internal("missing request id"))
            }));

        let first = assert_ok!(chain.call(RequestContext::new("/svc/Call"), ()).await);
        let second = assert_ok!(chain.call(RequestContext::new("/svc/Call"), ()).await);

        assert!(Uuid::parse_str(&first).is_ok());
        assert_ne!(first, second);
    }
}
