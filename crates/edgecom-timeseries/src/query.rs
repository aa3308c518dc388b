use crate::model::{Aggregation, Window};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 时序聚合查询
///
/// 查询区间为半开区间 `[start, end)`，结果按桶起始时间升序排列。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub window: Window,
    pub aggregation: Aggregation,
}

impl Query {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        window: Window,
        aggregation: Aggregation,
    ) -> Self {
        Self {
            start,
            end,
            window,
            aggregation,
        }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}

/// 计算时间戳所在桶的起始时间（以 Unix 纪元对齐）
pub fn bucket_start(timestamp: DateTime<Utc>, window: Window) -> DateTime<Utc> {
    let width = window.duration().num_seconds();
    let secs = timestamp.timestamp();
    let aligned = secs - secs.rem_euclid(width);

    DateTime::<Utc>::from_timestamp(aligned, 0).unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_bucket_start_alignment() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 37, 12).unwrap();

        assert_eq!(
            bucket_start(ts, Window::OneHour),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(
            bucket_start(ts, Window::FiveMinutes),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 35, 0).unwrap()
        );
        assert_eq!(
            bucket_start(ts, Window::OneDay),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_query_is_half_open() {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let query = Query::new(end - Duration::hours(1), end, Window::OneMinute, Aggregation::Sum);

        assert!(query.contains(end - Duration::hours(1)));
        assert!(query.contains(end - Duration::seconds(1)));
        assert!(!query.contains(end));
    }
}
