use crate::config::AppConfig;
use crate::health::{HealthChecker, ServingStatus};
use crate::model::{QueryTimeSeriesRequest, QueryTimeSeriesResponse, QUERY_METHOD};
use crate::service::TimeSeriesService;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use edgecom_middleware::{
    CacheInterceptor, ChainBuilder, Code, InterceptorChain, LoggingInterceptor,
    MetricsInterceptor, RateLimitInterceptor, RateLimiter, RequestContext, RequestIdInterceptor,
    RequestMetrics, ResponseCache, Status,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::error;

/// 请求截止时间（毫秒）
pub const TIMEOUT_HEADER: &str = "x-timeout-ms";

pub type QueryChain = InterceptorChain<QueryTimeSeriesRequest, QueryTimeSeriesResponse>;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub chain: Arc<QueryChain>,
    pub health: Arc<HealthChecker>,
    pub metrics: RequestMetrics,
}

/// 组装查询调用链：请求标识 → 限流 → 日志 → 指标 → 缓存 → 处理器
pub fn build_query_chain(
    service: TimeSeriesService,
    limiter: RateLimiter,
    cache: Arc<ResponseCache<QueryTimeSeriesResponse>>,
    metrics: RequestMetrics,
) -> QueryChain {
    ChainBuilder::new()
        .with(RequestIdInterceptor::new())
        .with(RateLimitInterceptor::new(limiter))
        .with(LoggingInterceptor::new())
        .with(MetricsInterceptor::new(metrics))
        .with(CacheInterceptor::new(cache))
        .build(service)
}

impl AppState {
    /// 按配置构建全部共享组件
    pub fn from_config(
        config: &AppConfig,
        service: TimeSeriesService,
    ) -> Result<Self, prometheus::Error> {
        let metrics = RequestMetrics::new()?;
        let chain = build_query_chain(
            service,
            RateLimiter::new(config.rate_limit.rate, config.rate_limit.burst),
            Arc::new(ResponseCache::new(config.cache.capacity)),
            metrics.clone(),
        );

        Ok(Self {
            chain: Arc::new(chain),
            health: Arc::new(HealthChecker::new()),
            metrics,
        })
    }
}

/// RPC 错误的 HTTP 表示
#[derive(Debug)]
pub struct ApiError(pub Status);

impl From<Status> for ApiError {
    fn from(status: Status) -> Self {
        ApiError(status)
    }
}

pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        // 499 Client Closed Request
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (http_status(self.0.code()), Json(self.0)).into_response()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HealthCheckRequest {
    #[serde(default)]
    pub service: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: ServingStatus,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(QUERY_METHOD, post(query_time_series))
        .route("/grpc.health.v1.Health/Check", post(health_check))
        .route("/grpc.health.v1.Health/Watch", post(health_watch))
        .route("/metrics", get(export_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn request_context(method: &str, headers: &HeaderMap) -> Result<RequestContext, ApiError> {
    let ctx = RequestContext::new(method);

    match headers.get(TIMEOUT_HEADER) {
        None => Ok(ctx),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|ms| ctx.with_timeout(Duration::from_millis(ms)))
            .ok_or_else(|| ApiError(Status::invalid_argument("invalid x-timeout-ms header"))),
    }
}

async fn query_time_series(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<QueryTimeSeriesRequest>, JsonRejection>,
) -> Result<Json<QueryTimeSeriesResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError(Status::invalid_argument(e.body_text())))?;
    let ctx = request_context(QUERY_METHOD, &headers)?;

    let resp = state.chain.call(ctx, req).await?;
    Ok(Json(resp))
}

async fn health_check(
    State(state): State<AppState>,
    payload: Result<Json<HealthCheckRequest>, JsonRejection>,
) -> Result<Json<HealthCheckResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError(Status::invalid_argument(e.body_text())))?;
    let status = state.health.check(&req.service).await?;
    Ok(Json(HealthCheckResponse { status }))
}

async fn health_watch(
    State(state): State<AppState>,
    payload: Result<Json<HealthCheckRequest>, JsonRejection>,
) -> Result<Json<HealthCheckResponse>, ApiError> {
    let service = payload.map(|Json(req)| req.service).unwrap_or_default();
    let status = state.health.watch(&service).await?;
    Ok(Json(HealthCheckResponse { status }))
}

async fn export_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.export() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to export metrics");
            ApiError(Status::internal("failed to export metrics")).into_response()
        }
    }
}
