use crate::error::{Result, StoreError};
use crate::model::{AggregatedPoint, TimeSeriesPoint};
use crate::query::Query;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement,
    TransactionTrait,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 单条 INSERT 语句携带的最大行数（Postgres 单语句参数上限为 65535）
const INSERT_CHUNK_ROWS: usize = 1000;

/// 时序数据仓库
///
/// 查询与批量写入共享同一个连接池；聚合与分桶由存储引擎完成。
#[async_trait]
pub trait TimeSeriesRepository: Send + Sync {
    /// 写入单个数据点
    async fn insert(&self, point: &TimeSeriesPoint) -> Result<()>;

    /// 批量写入，要么全部成功，要么全部回滚
    async fn batch_insert(&self, points: &[TimeSeriesPoint]) -> Result<()>;

    /// 分桶聚合查询，结果按桶起始时间升序，空桶省略
    async fn query(&self, query: &Query) -> Result<Vec<AggregatedPoint>>;

    /// 释放连接
    async fn close(&self) -> Result<()>;
}

/// TimescaleDB 连接参数
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl ConnectionSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// TimescaleDB 仓库实现
pub struct TimescaleRepository {
    db: DatabaseConnection,
    closed: AtomicBool,
}

impl TimescaleRepository {
    /// 连接数据库并验证连通性
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let mut options = ConnectOptions::new(settings.url.clone());
        options
            .max_connections(settings.max_connections)
            .connect_timeout(settings.connect_timeout)
            .sqlx_logging(false);

        let db = Database::connect(options)
            .await
            .map_err(|e| StoreError::operation("connect to database", e))?;
        db.ping()
            .await
            .map_err(|e| StoreError::operation("ping database", e))?;

        info!(
            max_connections = settings.max_connections,
            "Connected to TimescaleDB"
        );

        Ok(Self::from_connection(db))
    }

    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self {
            db,
            closed: AtomicBool::new(false),
        }
    }

    /// 获取数据库连接
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// 首次启动时建表；扩展不可用时退化为普通表
    pub async fn ensure_schema(&self) -> Result<()> {
        self.db
            .execute_unprepared(
                r#"
                CREATE TABLE IF NOT EXISTS time_series_data (
                    time  TIMESTAMPTZ      NOT NULL,
                    value DOUBLE PRECISION NOT NULL
                )
                "#,
            )
            .await
            .map_err(|e| StoreError::operation("create time_series_data", e))?;

        if let Err(e) = self
            .db
            .execute_unprepared(
                "SELECT create_hypertable('time_series_data', 'time', if_not_exists => TRUE)",
            )
            .await
        {
            warn!(error = %e, "Hypertable not created, continuing with a plain table");
        }

        self.db
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS time_series_data_time_idx ON time_series_data (time DESC)",
            )
            .await
            .map_err(|e| StoreError::operation("create time index", e))?;

        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

/// 构造分桶聚合 SQL
pub fn aggregate_sql(query: &Query) -> String {
    format!(
        "SELECT time_bucket('{}', time) AS bucket, {}(value) AS value \
         FROM time_series_data \
         WHERE time >= $1 AND time < $2 \
         GROUP BY bucket \
         ORDER BY bucket ASC",
        query.window.pg_interval(),
        query.aggregation.as_str(),
    )
}

/// 构造多行 INSERT 语句
pub fn insert_statement(points: &[TimeSeriesPoint]) -> Statement {
    let placeholders = (0..points.len())
        .map(|i| format!("(${}, ${})", i * 2 + 1, i * 2 + 2))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "INSERT INTO time_series_data (time, value) VALUES {}",
        placeholders
    );

    let values = points
        .iter()
        .flat_map(|p| [sea_orm::Value::from(p.timestamp), sea_orm::Value::from(p.value)])
        .collect::<Vec<_>>();

    Statement::from_sql_and_values(DatabaseBackend::Postgres, sql, values)
}

#[async_trait]
impl TimeSeriesRepository for TimescaleRepository {
    async fn insert(&self, point: &TimeSeriesPoint) -> Result<()> {
        self.ensure_open()?;

        self.db
            .execute(insert_statement(std::slice::from_ref(point)))
            .await
            .map_err(|e| StoreError::operation("insert data point", e))?;

        Ok(())
    }

    async fn batch_insert(&self, points: &[TimeSeriesPoint]) -> Result<()> {
        self.ensure_open()?;

        if points.is_empty() {
            return Ok(());
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| StoreError::operation("begin transaction", e))?;

        // txn 未提交即被 drop 时自动回滚
        for chunk in points.chunks(INSERT_CHUNK_ROWS) {
            txn.execute(insert_statement(chunk))
                .await
                .map_err(|e| StoreError::operation("insert data points", e))?;
        }

        txn.commit()
            .await
            .map_err(|e| StoreError::operation("commit transaction", e))?;

        debug!(count = points.len(), "Batch written to TimescaleDB");

        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<AggregatedPoint>> {
        self.ensure_open()?;

        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            aggregate_sql(query),
            vec![sea_orm::Value::from(query.start), sea_orm::Value::from(query.end)],
        );

        let rows = self
            .db
            .query_all(stmt)
            .await
            .map_err(|e| StoreError::operation("query time series", e))?;

        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let bucket_start: DateTime<Utc> = row.try_get("", "bucket")?;
            let value: f64 = row.try_get("", "value")?;
            points.push(AggregatedPoint {
                bucket_start,
                value,
            });
        }

        debug!(
            window = %query.window,
            aggregation = %query.aggregation,
            count = points.len(),
            "Queried aggregated series from TimescaleDB"
        );

        Ok(points)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.db
            .clone()
            .close()
            .await
            .map_err(|e| StoreError::operation("close database", e))?;

        info!("TimescaleDB connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Aggregation, Window};
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_aggregate_sql() {
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let query = Query::new(end - Duration::days(1), end, Window::OneHour, Aggregation::Avg);

        let sql = aggregate_sql(&query);
        assert!(sql.contains("time_bucket('1 hour', time)"));
        assert!(sql.contains("AVG(value)"));
        assert!(sql.contains("time >= $1 AND time < $2"));
        assert!(sql.ends_with("ORDER BY bucket ASC"));
    }

    #[test]
    fn test_insert_statement_placeholders() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let points = vec![
            TimeSeriesPoint::new(now, 1.0),
            TimeSeriesPoint::new(now + Duration::minutes(5), 2.0),
        ];

        let stmt = insert_statement(&points);
        assert!(stmt.sql.ends_with("VALUES ($1, $2), ($3, $4)"));
        assert_eq!(stmt.values.map(|v| v.0.len()), Some(4));
    }
}
