use chrono::{DateTime, Utc};
use edgecom_timeseries::AggregatedPoint;
use serde::{Deserialize, Serialize};

/// 服务名
pub const SERVICE_NAME: &str = "timeseries.TimeSeriesService";

/// 查询方法的完整名称
pub const QUERY_METHOD: &str = "/timeseries.TimeSeriesService/QueryTimeSeries";

/// 查询请求
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryTimeSeriesRequest {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub window: String,
    #[serde(default)]
    pub aggregation: String,
}

/// 查询响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryTimeSeriesResponse {
    pub data: Vec<DataPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

impl From<AggregatedPoint> for DataPoint {
    fn from(point: AggregatedPoint) -> Self {
        Self {
            time: point.bucket_start,
            value: point.value,
        }
    }
}

impl From<Vec<AggregatedPoint>> for QueryTimeSeriesResponse {
    fn from(points: Vec<AggregatedPoint>) -> Self {
        Self {
            data: points.into_iter().map(DataPoint::from).collect(),
        }
    }
}
