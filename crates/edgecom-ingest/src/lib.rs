//! 上游数据采集：历史回填与周期刷新

pub mod error;
pub mod fetcher;
pub mod model;
pub mod scheduler;

pub use error::{IngestError, Result};
pub use fetcher::{SeriesFetcher, DEFAULT_REQUEST_TIMEOUT};
pub use model::{ApiPoint, ApiResponse};
pub use scheduler::{IngestSchedule, IngestScheduler};
