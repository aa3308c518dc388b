use crate::error::{Result, StoreError};
use crate::model::{AggregatedPoint, TimeSeriesPoint};
use crate::query::{bucket_start, Query};
use crate::store::TimeSeriesRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// 内存仓库
///
/// 与 [`TimescaleRepository`](crate::TimescaleRepository) 遵循同一契约，
/// 分桶按 Unix 纪元对齐，用于测试与本地运行。
#[derive(Default)]
pub struct MemoryRepository {
    points: RwLock<Vec<TimeSeriesPoint>>,
    fail_queries: AtomicBool,
    fail_inserts: AtomicBool,
    closed: AtomicBool,
    query_calls: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用预置数据创建
    pub fn with_points(points: Vec<TimeSeriesPoint>) -> Self {
        Self {
            points: RwLock::new(points),
            ..Self::default()
        }
    }

    /// 之后的查询全部失败
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// 之后的写入全部失败
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// 当前已存储的全部数据点
    pub async fn points(&self) -> Vec<TimeSeriesPoint> {
        self.points.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("insert rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TimeSeriesRepository for MemoryRepository {
    async fn insert(&self, point: &TimeSeriesPoint) -> Result<()> {
        self.check_writable()?;
        self.points.write().await.push(*point);
        Ok(())
    }

    async fn batch_insert(&self, points: &[TimeSeriesPoint]) -> Result<()> {
        self.check_writable()?;
        self.points.write().await.extend_from_slice(points);
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<AggregatedPoint>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);

        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }

        let mut buckets: BTreeMap<DateTime<Utc>, Vec<f64>> = BTreeMap::new();
        for point in self.points.read().await.iter() {
            if query.contains(point.timestamp) {
                buckets
                    .entry(bucket_start(point.timestamp, query.window))
                    .or_default()
                    .push(point.value);
            }
        }

        Ok(buckets
            .into_iter()
            .filter_map(|(bucket_start, values)| {
                query
                    .aggregation
                    .apply(&values)
                    .map(|value| AggregatedPoint {
                        bucket_start,
                        value,
                    })
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Aggregation, Window};
    use chrono::{Duration, TimeZone};
    use tokio_test::{assert_err, assert_ok};

    fn hourly_fixture(end: DateTime<Utc>) -> Vec<TimeSeriesPoint> {
        // 过去两小时每 30 分钟一个点
        (0..4)
            .map(|i| {
                TimeSeriesPoint::new(end - Duration::hours(2) + Duration::minutes(30 * i), i as f64)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_query_buckets_ascending() {
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let repo = MemoryRepository::with_points(hourly_fixture(end));

        let query = Query::new(end - Duration::hours(2), end, Window::OneHour, Aggregation::Sum);
        let result = repo.query(&query).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].bucket_start, end - Duration::hours(2));
        assert_eq!(result[0].value, 1.0);
        assert_eq!(result[1].value, 5.0);
    }

    #[tokio::test]
    async fn test_empty_buckets_are_omitted() {
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let repo = MemoryRepository::with_points(vec![
            TimeSeriesPoint::new(end - Duration::minutes(50), 1.0),
            TimeSeriesPoint::new(end - Duration::minutes(5), 3.0),
        ]);

        let query = Query::new(end - Duration::hours(1), end, Window::FiveMinutes, Aggregation::Max);
        let result = repo.query(&query).await.unwrap();

        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let repo = MemoryRepository::new();
        let now = Utc::now();

        repo.fail_inserts(true);
        assert_err!(repo.batch_insert(&[TimeSeriesPoint::new(now, 1.0)]).await);
        assert!(repo.is_empty().await);

        repo.fail_inserts(false);
        assert_ok!(repo.insert(&TimeSeriesPoint::new(now, 1.0)).await);
        assert_eq!(repo.len().await, 1);

        repo.fail_queries(true);
        let query = Query::new(now - Duration::hours(1), now, Window::OneHour, Aggregation::Avg);
        assert_err!(repo.query(&query).await);
    }

    #[tokio::test]
    async fn test_closed_repository_rejects_calls() {
        let repo = MemoryRepository::new();
        assert_ok!(repo.close().await);
        assert!(repo.is_closed());
        assert!(matches!(
            repo.insert(&TimeSeriesPoint::new(Utc::now(), 1.0)).await,
            Err(StoreError::Closed)
        ));
    }
}
