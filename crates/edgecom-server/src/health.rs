use crate::model::SERVICE_NAME;
use edgecom_middleware::Status;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

/// 服务健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Serving,
    NotServing,
}

/// 健康检查服务，按服务名记录状态
pub struct HealthChecker {
    statuses: RwLock<HashMap<String, ServingStatus>>,
}

impl HealthChecker {
    /// 默认登记整体状态（空服务名）与查询服务，均为 SERVING
    pub fn new() -> Self {
        let mut statuses = HashMap::new();
        statuses.insert(String::new(), ServingStatus::Serving);
        statuses.insert(SERVICE_NAME.to_string(), ServingStatus::Serving);

        Self {
            statuses: RwLock::new(statuses),
        }
    }

    pub async fn check(&self, service: &str) -> Result<ServingStatus, Status> {
        self.statuses
            .read()
            .await
            .get(service)
            .copied()
            .ok_or_else(|| Status::not_found("unknown service"))
    }

    /// 不支持订阅
    pub async fn watch(&self, _service: &str) -> Result<ServingStatus, Status> {
        Err(Status::unimplemented("watching is not supported"))
    }

    pub async fn set_serving_status(&self, service: &str, status: ServingStatus) {
        info!(service = service, status = ?status, "Health status updated");
        self.statuses
            .write()
            .await
            .insert(service.to_string(), status);
    }

    /// 将所有已登记的服务设为同一状态
    pub async fn set_all(&self, status: ServingStatus) {
        let mut statuses = self.statuses.write().await;
        for value in statuses.values_mut() {
            *value = status;
        }
        info!(status = ?status, "Health status updated for all services");
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgecom_middleware::Code;

    #[tokio::test]
    async fn test_default_services() {
        let health = HealthChecker::new();
        assert_eq!(health.check("").await, Ok(ServingStatus::Serving));
        assert_eq!(health.check(SERVICE_NAME).await, Ok(ServingStatus::Serving));

        let err = health.check("unknown.Service").await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.message(), "unknown service");
    }

    #[tokio::test]
    async fn test_watch_is_unimplemented() {
        let health = HealthChecker::new();
        let err = health.watch("").await.unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_set_all() {
        let health = HealthChecker::new();
        health.set_serving_status("extra", ServingStatus::Serving).await;
        health.set_all(ServingStatus::NotServing).await;

        assert_eq!(health.check("").await, Ok(ServingStatus::NotServing));
        assert_eq!(health.check("extra").await, Ok(ServingStatus::NotServing));
    }
}
