use edgecom_timeseries::StoreError;
use std::time::Duration;
use thiserror::Error;

/// 数据采集错误
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("error making API request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("error status from API: got {status}")]
    Status { status: u16 },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("API request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to insert data points: {0}")]
    Store(#[from] StoreError),

    #[error("failed to fetch recent data: {0}")]
    Bootstrap(#[source] Box<IngestError>),
}

impl IngestError {
    /// 上游返回的 HTTP 状态码
    pub fn status(&self) -> Option<u16> {
        match self {
            IngestError::Status { status } => Some(*status),
            IngestError::Bootstrap(inner) => inner.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
