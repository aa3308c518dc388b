use crate::model::QueryTimeSeriesRequest;
use chrono::{DateTime, Duration, Utc};
use edgecom_middleware::Status;
use edgecom_timeseries::{Aggregation, Query, Window};
use thiserror::Error;

/// 请求校验错误，消息文本对调用方可见
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("start time must be before end time")]
    InvalidRange,

    #[error("time range exceeds maximum allowed")]
    RangeTooLarge,

    #[error("invalid window: {0}")]
    InvalidWindow(String),

    #[error("invalid aggregation")]
    EmptyAggregation,

    #[error("invalid aggregation: {0}")]
    InvalidAggregation(String),
}

impl From<ValidationError> for Status {
    fn from(err: ValidationError) -> Self {
        Status::invalid_argument(err.to_string())
    }
}

/// 请求校验器
///
/// 按顺序检查时间戳、区间、跨度、窗口、聚合方式，第一个失败即返回。
#[derive(Debug, Clone, Copy)]
pub struct RequestValidator {
    max_range: Duration,
}

impl RequestValidator {
    pub fn new() -> Self {
        Self {
            max_range: Duration::days(2 * 365),
        }
    }

    pub fn max_range(&self) -> Duration {
        self.max_range
    }

    pub fn validate(&self, req: &QueryTimeSeriesRequest) -> Result<Query, ValidationError> {
        let (start, end) = match (present(req.start), present(req.end)) {
            (Some(start), Some(end)) => (start, end),
            _ => return Err(ValidationError::MissingTimestamp),
        };

        if start >= end {
            return Err(ValidationError::InvalidRange);
        }

        if end - start > self.max_range {
            return Err(ValidationError::RangeTooLarge);
        }

        let window: Window = req
            .window
            .parse()
            .map_err(|_| ValidationError::InvalidWindow(req.window.clone()))?;

        if req.aggregation.is_empty() {
            return Err(ValidationError::EmptyAggregation);
        }
        let aggregation: Aggregation = req
            .aggregation
            .parse()
            .map_err(|_| ValidationError::InvalidAggregation(req.aggregation.clone()))?;

        Ok(Query::new(start, end, window, aggregation))
    }
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// 纪元零点视为未设置
fn present(ts: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    ts.filter(|ts| ts.timestamp() != 0 || ts.timestamp_subsec_nanos() != 0)
}
