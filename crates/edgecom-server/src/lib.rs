//! EdgeCom 时序查询服务
//!
//! 查询请求经过拦截器链（请求标识、限流、日志、指标、缓存）到达
//! [`TimeSeriesService`]；后台的回填与周期拉取负责把上游数据写入存储。

pub mod api;
pub mod app;
pub mod config;
pub mod health;
pub mod logging;
pub mod model;
pub mod resources;
pub mod service;
pub mod validator;

pub use api::{build_query_chain, create_router, ApiError, AppState};
pub use app::{run, Application};
pub use config::{AppConfig, ConfigOverrides};
pub use health::{HealthChecker, ServingStatus};
pub use model::{DataPoint, QueryTimeSeriesRequest, QueryTimeSeriesResponse};
pub use service::TimeSeriesService;
pub use validator::{RequestValidator, ValidationError};
