use edgecom_timeseries::TimeSeriesPoint;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 上游接口响应
///
/// ```json
/// { "result": [ { "time": 1637760000, "value": 42.5 } ] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub result: Vec<ApiPoint>,
}

/// 上游数据点，`time` 为 Unix 秒
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApiPoint {
    pub time: i64,
    pub value: f64,
}

impl ApiResponse {
    /// 转换为内部数据点，超出可表示范围的时间戳被丢弃
    pub fn into_points(self) -> Vec<TimeSeriesPoint> {
        self.result
            .into_iter()
            .filter_map(|p| {
                let point = TimeSeriesPoint::from_unix(p.time, p.value);
                if point.is_none() {
                    warn!(time = p.time, "Dropping data point with invalid timestamp");
                }
                point
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_api_response() {
        let json = r#"{"result":[{"time":1637760000,"value":42.5},{"time":1637760300,"value":43.0}]}"#;
        let resp: ApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.result.len(), 2);

        let points = resp.into_points();
        assert_eq!(points[0].timestamp.timestamp(), 1637760000);
        assert_eq!(points[1].value, 43.0);
    }

    #[test]
    fn test_missing_result_is_empty() {
        let resp: ApiResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.into_points().is_empty());
    }
}
