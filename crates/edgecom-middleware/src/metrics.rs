use crate::chain::{Interceptor, Next, RequestContext};
use crate::status::Status;
use async_trait::async_trait;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use tokio::time::Instant;

/// 请求指标
///
/// 计数与耗时按方法短名打标签，无论调用成功与否都会记录。
#[derive(Clone)]
pub struct RequestMetrics {
    requests_total: CounterVec,
    request_duration: HistogramVec,
    registry: Registry,
}

impl RequestMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// 在指定 Registry 上注册
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let requests_total = CounterVec::new(
            Opts::new("grpc_requests_total", "Total number of RPC requests"),
            &["method"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("grpc_request_duration_seconds", "RPC request duration"),
            &["method"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            requests_total,
            request_duration,
            registry,
        })
    }

    pub fn record(&self, method: &str, duration: f64) {
        self.requests_total.with_label_values(&[method]).inc();
        self.request_duration
            .with_label_values(&[method])
            .observe(duration);
    }

    pub fn request_count(&self, method: &str) -> f64 {
        self.requests_total.with_label_values(&[method]).get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// 导出为 Prometheus 文本格式
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// 指标拦截器
pub struct MetricsInterceptor {
    metrics: RequestMetrics,
}

impl MetricsInterceptor {
    pub fn new(metrics: RequestMetrics) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl<Req, Resp> Interceptor<Req, Resp> for MetricsInterceptor
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
        let method = ctx.method_name().to_string();
        let start = Instant::now();

        let result = next.run(ctx, req).await;
        self.metrics
            .record(&method, start.elapsed().as_secs_f64());

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;
    use crate::chain::{handler_fn, ChainBuilder};

    #[tokio::test]
    async fn test_metrics_recorded_on_success_and_error() {
        let metrics = assert_ok!(RequestMetrics::new());

        let chain = ChainBuilder::new()
            .with(MetricsInterceptor::new(metrics.clone()))
            .build(handler_fn(|_ctx, fail: bool| async move {
                if fail {
                    Err(Status::internal("query failed: boom"))
                } else {
                    Ok(())
                }
            }));

        let method = "/timeseries.TimeSeriesService/QueryTimeSeries";
        assert!(chain.call(RequestContext::new(method), false).await.is_ok());
        assert!(chain.call(RequestContext::new(method), true).await.is_err());

        assert_eq!(metrics.request_count("QueryTimeSeries"), 2.0);

        let exported = metrics.export().unwrap();
        assert!(exported.contains("grpc_requests_total{method=\"QueryTimeSeries\"} 2"));
        assert!(exported.contains("grpc_request_duration_seconds_count{method=\"QueryTimeSeries\"} 2"));
    }
}
