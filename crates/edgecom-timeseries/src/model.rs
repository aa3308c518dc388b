use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 原始时序数据点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// 从 Unix 秒构造，超出 chrono 可表示范围时返回 None
    pub fn from_unix(secs: i64, value: f64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp(secs, 0).map(|timestamp| Self { timestamp, value })
    }
}

/// 聚合结果数据点（每个非空桶一个）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPoint {
    pub bucket_start: DateTime<Utc>,
    pub value: f64,
}

/// 聚合时间窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl Window {
    pub const ALL: [Window; 4] = [
        Window::OneMinute,
        Window::FiveMinutes,
        Window::OneHour,
        Window::OneDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Window::OneMinute => "1m",
            Window::FiveMinutes => "5m",
            Window::OneHour => "1h",
            Window::OneDay => "1d",
        }
    }

    /// 桶宽度
    pub fn duration(&self) -> Duration {
        match self {
            Window::OneMinute => Duration::minutes(1),
            Window::FiveMinutes => Duration::minutes(5),
            Window::OneHour => Duration::hours(1),
            Window::OneDay => Duration::days(1),
        }
    }

    /// TimescaleDB time_bucket 使用的 interval 字面量
    pub fn pg_interval(&self) -> &'static str {
        match self {
            Window::OneMinute => "1 minute",
            Window::FiveMinutes => "5 minutes",
            Window::OneHour => "1 hour",
            Window::OneDay => "1 day",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Window::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// 聚合函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Min,
    Max,
    Avg,
    Sum,
}

impl Aggregation {
    pub const ALL: [Aggregation; 4] = [
        Aggregation::Min,
        Aggregation::Max,
        Aggregation::Avg,
        Aggregation::Sum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Min => "MIN",
            Aggregation::Max => "MAX",
            Aggregation::Avg => "AVG",
            Aggregation::Sum => "SUM",
        }
    }

    /// 对一组值求聚合，空集合返回 None
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }

        let result = match self {
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
        };

        Some(result)
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Aggregation::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}
