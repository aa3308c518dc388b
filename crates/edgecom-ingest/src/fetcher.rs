use crate::error::{IngestError, Result};
use crate::model::ApiResponse;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use edgecom_timeseries::TimeSeriesRepository;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// 上游接口的时间参数格式
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const CLIENT_USER_AGENT: &str = "EdgeCom-Client/1.0";

/// 单次拉取的默认超时
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 从上游接口拉取时序数据并写入仓库
pub struct SeriesFetcher {
    api_url: String,
    client: reqwest::Client,
    repository: Arc<dyn TimeSeriesRepository>,
    request_timeout: Duration,
    history: ChronoDuration,
    fallback: ChronoDuration,
}

impl SeriesFetcher {
    pub fn new(api_url: impl Into<String>, repository: Arc<dyn TimeSeriesRepository>) -> Self {
        Self {
            api_url: api_url.into(),
            client: reqwest::Client::new(),
            repository,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            history: ChronoDuration::days(730),
            fallback: ChronoDuration::hours(24),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 设置历史回填窗口与失败后的回退窗口
    pub fn with_bootstrap_windows(mut self, history: ChronoDuration, fallback: ChronoDuration) -> Self {
        self.history = history;
        self.fallback = fallback;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// 拉取 `[start, end)` 的数据并以单个批次写入，返回写入的点数
    ///
    /// 整个过程受请求超时约束；调用方可以在外层再套一层更短的超时。
    pub async fn fetch_data(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize> {
        tokio::time::timeout(self.request_timeout, self.fetch_and_store(start, end))
            .await
            .map_err(|_| IngestError::Timeout(self.request_timeout))?
    }

    async fn fetch_and_store(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<usize> {
        let start_param = start.format(TIME_FORMAT).to_string();
        let end_param = end.format(TIME_FORMAT).to_string();

        debug!(
            url = %self.api_url,
            start = %start_param,
            end = %end_param,
            "Fetching data from API"
        );

        let response = self
            .client
            .get(&self.api_url)
            .query(&[("start", start_param.as_str()), ("end", end_param.as_str())])
            .header(ACCEPT, "*/*")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "API request failed");
            return Err(IngestError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let payload: ApiResponse = serde_json::from_slice(&body)?;

        if payload.result.is_empty() {
            debug!("No data points received from API");
            return Ok(0);
        }

        let points = payload.into_points();
        self.repository.batch_insert(&points).await?;

        debug!(count = points.len(), "Successfully inserted data points");
        Ok(points.len())
    }

    /// 历史数据回填
    pub async fn bootstrap_historical_data(&self) -> Result<()> {
        self.bootstrap_historical_data_at(Utc::now()).await
    }

    /// 以指定时刻为终点回填：先尝试完整历史窗口，失败后只重试一次最近的回退窗口
    pub async fn bootstrap_historical_data_at(&self, now: DateTime<Utc>) -> Result<()> {
        let start = now - self.history;

        info!(start = %start, end = %now, "Starting historical data bootstrap");

        if let Err(e) = self.fetch_data(start, now).await {
            error!(error = %e, "Failed to fetch historical data");

            let recent_start = now - self.fallback;
            info!(start = %recent_start, end = %now, "Attempting to fetch recent data only");

            self.fetch_data(recent_start, now)
                .await
                .map_err(|e| IngestError::Bootstrap(Box::new(e)))?;
        }

        info!("Historical data bootstrap completed");
        Ok(())
    }
}
