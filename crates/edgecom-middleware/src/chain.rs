use crate::status::Status;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// 单次调用的上下文
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// 完整方法名，如 `/timeseries.TimeSeriesService/QueryTimeSeries`
    pub method: String,
    /// 由请求标识拦截器注入
    pub request_id: Option<String>,
    /// 调用方给出的截止时间
    pub deadline: Option<Instant>,
    /// 调用方取消信号，值变为 `true` 或发送端被丢弃即视为取消
    pub cancel: Option<watch::Receiver<bool>>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            request_id: None,
            deadline: None,
            cancel: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// 等待调用方取消；没有取消信号时永不返回
    pub async fn cancelled(&self) {
        let Some(mut cancel) = self.cancel.clone() else {
            return std::future::pending().await;
        };

        while !*cancel.borrow_and_update() {
            if cancel.changed().await.is_err() {
                return;
            }
        }
    }

    /// 距截止时间的剩余时长
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// 方法短名（完整方法名的最后一段）
    pub fn method_name(&self) -> &str {
        self.method.rsplit('/').next().unwrap_or(&self.method)
    }

    pub fn request_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or("-")
    }
}

/// 链尾的业务处理器
#[async_trait]
pub trait Handler<Req, Resp>: Send + Sync
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn call(&self, ctx: RequestContext, req: Req) -> Result<Resp, Status>;
}

/// 拦截器
///
/// 可以短路返回，也可以修改上下文后通过 `next` 继续调用链的剩余部分。
#[async_trait]
pub trait Interceptor<Req, Resp>: Send + Sync
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn intercept(
        &self,
        ctx: RequestContext,
        req: Req,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp, Status>;
}

/// 调用链的剩余部分
pub struct Next<'a, Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    interceptors: &'a [Arc<dyn Interceptor<Req, Resp>>],
    handler: &'a dyn Handler<Req, Resp>,
}

impl<'a, Req, Resp> Next<'a, Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub async fn run(self, ctx: RequestContext, req: Req) -> Result<Resp, Status> {
        match self.interceptors.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    interceptors: rest,
                    handler: self.handler,
                };
                current.intercept(ctx, req, next).await
            }
            None => self.handler.call(ctx, req).await,
        }
    }
}

/// 组装好的调用链，单一入口
pub struct InterceptorChain<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    interceptors: Vec<Arc<dyn Interceptor<Req, Resp>>>,
    handler: Arc<dyn Handler<Req, Resp>>,
}

impl<Req, Resp> InterceptorChain<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn builder() -> ChainBuilder<Req, Resp> {
        ChainBuilder::new()
    }

    pub async fn call(&self, ctx: RequestContext, req: Req) -> Result<Resp, Status> {
        let next = Next {
            interceptors: &self.interceptors,
            handler: self.handler.as_ref(),
        };
        next.run(ctx, req).await
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

/// 调用链构建器，先添加的拦截器位于最外层
pub struct ChainBuilder<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    interceptors: Vec<Arc<dyn Interceptor<Req, Resp>>>,
}

impl<Req, Resp> ChainBuilder<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    pub fn with<I>(mut self, interceptor: I) -> Self
    where
        I: Interceptor<Req, Resp> + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn with_shared(mut self, interceptor: Arc<dyn Interceptor<Req, Resp>>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn build<H>(self, handler: H) -> InterceptorChain<Req, Resp>
    where
        H: Handler<Req, Resp> + 'static,
    {
        self.build_shared(Arc::new(handler))
    }

    pub fn build_shared(self, handler: Arc<dyn Handler<Req, Resp>>) -> InterceptorChain<Req, Resp> {
        InterceptorChain {
            interceptors: self.interceptors,
            handler,
        }
    }
}

impl<Req, Resp> Default for ChainBuilder<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// 闭包形式的处理器
pub struct FnHandler<F>(F);

pub fn handler_fn<Req, Resp, F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(RequestContext, Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp, Status>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<Req, Resp, F, Fut> Handler<Req, Resp> for FnHandler<F>
where
    Req: Send + 'static,
    Resp: Send + 'static,
    F: Fn(RequestContext, Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp, Status>> + Send,
{
    async fn call(&self, ctx: RequestContext, req: Req) -> Result<Resp, Status> {
        (self.0)(ctx, req).await
    }
}
