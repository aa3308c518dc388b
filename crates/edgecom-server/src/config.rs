use anyhow::{bail, Result};
use config::{Config, Environment, File, FileFormat};
use edgecom_ingest::IngestSchedule;
use edgecom_timeseries::ConnectionSettings;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 默认配置文件
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 环境变量前缀，例如 `EDGECOM_DATABASE__HOST`
pub const ENV_PREFIX: &str = "EDGECOM";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 上游数据接口地址
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,
    /// 关闭时等待请求排空的宽限期（秒）
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// 连接超时（秒）
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// 完整连接串，设置后忽略上面的分项
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    /// 每秒补充的令牌数
    #[serde(default = "default_rate")]
    pub rate: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_backfill_days")]
    pub backfill_days: i64,
    #[serde(default = "default_fallback_hours")]
    pub fallback_hours: i64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

/// 命令行覆盖项，未设置的保持文件中的值
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub cache_size: Option<usize>,
    pub rate_limit: Option<f64>,
    pub rate_limit_burst: Option<u32>,
    pub conn_string: Option<String>,
}

impl AppConfig {
    /// 加载配置：TOML 文件 + `EDGECOM_` 环境变量
    ///
    /// 未指定路径时读取 `config.toml`，文件不存在则使用默认值。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(capacity) = overrides.cache_size {
            self.cache.capacity = capacity;
        }
        if let Some(rate) = overrides.rate_limit {
            self.rate_limit.rate = rate;
        }
        if let Some(burst) = overrides.rate_limit_burst {
            self.rate_limit.burst = burst;
        }
        if let Some(url) = overrides.conn_string {
            self.database.url = Some(url);
        }
        self
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            bail!("cache.capacity must be greater than 0");
        }
        if !(self.rate_limit.rate > 0.0) {
            bail!("rate_limit.rate must be greater than 0");
        }
        if self.rate_limit.burst == 0 {
            bail!("rate_limit.burst must be greater than 0");
        }
        if self.server.upstream_url.trim().is_empty() {
            bail!("server.upstream_url must not be empty");
        }
        if self.ingest.interval_secs == 0 {
            bail!("ingest.interval_secs must be greater than 0");
        }
        if !(1..=MAX_BACKFILL_DAYS).contains(&self.ingest.backfill_days) {
            bail!("ingest.backfill_days must be between 1 and {}", MAX_BACKFILL_DAYS);
        }
        if !(1..=self.ingest.backfill_days * 24).contains(&self.ingest.fallback_hours) {
            bail!("ingest.fallback_hours must be between 1 and backfill_days * 24");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.server.grace_period_secs)
    }
}

impl DatabaseConfig {
    /// Postgres 连接串
    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        let credentials = if self.password.is_empty() {
            self.user.clone()
        } else {
            format!("{}:{}", self.user, self.password)
        };

        format!(
            "postgres://{}@{}:{}/{}?sslmode={}",
            credentials, self.host, self.port, self.name, self.ssl_mode
        )
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            url: self.connection_string(),
            max_connections: self.max_connections,
            connect_timeout: Duration::from_secs(self.connection_timeout),
        }
    }
}

impl IngestConfig {
    pub fn schedule(&self) -> IngestSchedule {
        IngestSchedule {
            interval: Duration::from_secs(self.interval_secs),
            run_timeout: Duration::from_secs(self.run_timeout_secs),
            window: Duration::from_secs(self.interval_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backfill_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.backfill_days)
    }

    pub fn fallback_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.fallback_hours)
    }
}

/// 回填窗口上限（十年）
const MAX_BACKFILL_DAYS: i64 = 3650;

// 默认值函数
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_upstream_url() -> String {
    "http://localhost:8000/timeseries".to_string()
}

fn default_grace_period_secs() -> u64 {
    30
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "timeseries".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_rate() -> f64 {
    5.0
}

fn default_burst() -> u32 {
    10
}

fn default_interval_secs() -> u64 {
    300
}

fn default_run_timeout_secs() -> u64 {
    120
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_backfill_days() -> i64 {
    730
}

fn default_fallback_hours() -> i64 {
    24
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

// Default trait 实现
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream_url: default_upstream_url(),
            grace_period_secs: default_grace_period_secs(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            name: default_db_name(),
            user: default_db_user(),
            password: String::new(),
            ssl_mode: default_ssl_mode(),
            max_connections: default_max_connections(),
            connection_timeout: default_connection_timeout(),
            url: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            burst: default_burst(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            run_timeout_secs: default_run_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            backfill_days: default_backfill_days(),
            fallback_hours: default_fallback_hours(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
