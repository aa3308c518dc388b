use crate::model::{QueryTimeSeriesRequest, QueryTimeSeriesResponse};
use crate::validator::RequestValidator;
use async_trait::async_trait;
use edgecom_middleware::{Handler, RequestContext, Status};
use edgecom_timeseries::TimeSeriesRepository;
use std::sync::Arc;
use tracing::{debug, error};

/// 时序查询服务
///
/// 无可变状态，可被多个请求并发调用。
pub struct TimeSeriesService {
    repository: Arc<dyn TimeSeriesRepository>,
    validator: RequestValidator,
}

impl TimeSeriesService {
    pub fn new(repository: Arc<dyn TimeSeriesRepository>) -> Self {
        Self {
            repository,
            validator: RequestValidator::new(),
        }
    }

    pub async fn query_time_series(
        &self,
        ctx: &RequestContext,
        req: &QueryTimeSeriesRequest,
    ) -> Result<QueryTimeSeriesResponse, Status> {
        let query = self.validator.validate(req).map_err(|e| {
            debug!(request_id = ctx.request_id(), error = %e, "Request rejected by validator");
            Status::from(e)
        })?;

        let lookup = self.repository.query(&query);
        let bounded = async {
            match ctx.remaining() {
                Some(remaining) if remaining.is_zero() => {
                    Err(Status::deadline_exceeded("deadline exceeded"))
                }
                Some(remaining) => tokio::time::timeout(remaining, lookup)
                    .await
                    .map_err(|_| Status::deadline_exceeded("deadline exceeded")),
                None => Ok(lookup.await),
            }
        };

        // 取消时丢弃进行中的存储调用
        let result = tokio::select! {
            result = bounded => result?,
            _ = ctx.cancelled() => {
                debug!(request_id = ctx.request_id(), "Query cancelled by caller");
                return Err(Status::cancelled("request cancelled"));
            }
        };

        let points = result.map_err(|e| {
            error!(
                request_id = ctx.request_id(),
                start = %query.start,
                end = %query.end,
                window = %query.window,
                aggregation = %query.aggregation,
                error = %e,
                "Time series query failed"
            );
            Status::internal(format!("query failed: {}", e))
        })?;

        Ok(QueryTimeSeriesResponse::from(points))
    }
}

#[async_trait]
impl Handler<QueryTimeSeriesRequest, QueryTimeSeriesResponse> for TimeSeriesService {
    async fn call(
        &self,
        ctx: RequestContext,
        req: QueryTimeSeriesRequest,
    ) -> Result<QueryTimeSeriesResponse, Status> {
        self.query_time_series(&ctx, &req).await
    }
}
