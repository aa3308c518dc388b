use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Cleanup failed: {0}")]
    CleanupFailed(String),
}

/// 关闭时需要释放的资源
#[async_trait]
pub trait Resource: Send + Sync {
    /// 清理资源
    async fn cleanup(&self) -> Result<(), ResourceError>;

    /// 资源名称
    fn name(&self) -> &str;

    /// 清理优先级（数字越小越先清理）
    fn priority(&self) -> u32 {
        100
    }
}

/// 资源管理器，按优先级依次清理，单个资源失败不影响后续资源
pub struct ResourceManager {
    resources: Vec<Arc<dyn Resource>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self {
            resources: Vec::new(),
        }
    }

    /// 注册资源
    pub fn register(&mut self, resource: Arc<dyn Resource>) {
        info!(resource = resource.name(), priority = resource.priority(), "Registering resource");
        self.resources.push(resource);
    }

    /// 清理所有资源，返回失败的资源名称
    pub async fn cleanup_all(&mut self) -> Vec<String> {
        // 稳定排序，同优先级保持注册顺序
        self.resources.sort_by_key(|r| r.priority());

        info!(count = self.resources.len(), "Cleaning up resources");

        let mut failed = Vec::new();
        for resource in &self.resources {
            match resource.cleanup().await {
                Ok(()) => {
                    info!(resource = resource.name(), "Resource cleaned up");
                }
                Err(e) => {
                    error!(resource = resource.name(), error = %e, "Failed to clean up resource");
                    failed.push(resource.name().to_string());
                }
            }
        }

        info!("Resource cleanup complete");
        failed
    }

    /// 获取资源数量
    pub fn count(&self) -> usize {
        self.resources.len()
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}
