use async_trait::async_trait;
use edgecom_ingest::IngestScheduler;
use edgecom_shutdown::{Resource, ResourceError};
use edgecom_timeseries::TimeSeriesRepository;
use std::sync::Arc;
use tokio::task::AbortHandle;

/// 尚未完成的历史回填任务，关闭时直接中止
pub struct BackfillResource {
    handle: AbortHandle,
}

impl BackfillResource {
    pub fn new(handle: AbortHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Resource for BackfillResource {
    async fn cleanup(&self) -> Result<(), ResourceError> {
        self.handle.abort();
        Ok(())
    }

    fn name(&self) -> &str {
        "backfill"
    }

    fn priority(&self) -> u32 {
        5
    }
}

/// 周期拉取调度器
pub struct SchedulerResource {
    scheduler: Arc<IngestScheduler>,
}

impl SchedulerResource {
    pub fn new(scheduler: Arc<IngestScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Resource for SchedulerResource {
    async fn cleanup(&self) -> Result<(), ResourceError> {
        self.scheduler.stop().await;
        Ok(())
    }

    fn name(&self) -> &str {
        "scheduler"
    }

    fn priority(&self) -> u32 {
        10
    }
}

/// 存储连接，必须在调度器之后关闭
pub struct StoreResource {
    repository: Arc<dyn TimeSeriesRepository>,
}

impl StoreResource {
    pub fn new(repository: Arc<dyn TimeSeriesRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Resource for StoreResource {
    async fn cleanup(&self) -> Result<(), ResourceError> {
        self.repository
            .close()
            .await
            .map_err(|e| ResourceError::CleanupFailed(e.to_string()))
    }

    fn name(&self) -> &str {
        "store"
    }

    fn priority(&self) -> u32 {
        20
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgecom_ingest::{IngestSchedule, SeriesFetcher};
    use edgecom_shutdown::ResourceManager;
    use edgecom_timeseries::MemoryRepository;

    #[tokio::test]
    async fn test_scheduler_stops_before_store_closes() {
        let repo = Arc::new(MemoryRepository::new());
        let fetcher = Arc::new(SeriesFetcher::new("http://127.0.0.1:9/timeseries", repo.clone()));
        let scheduler = Arc::new(IngestScheduler::new(fetcher, IngestSchedule::default()));
        scheduler.start().await;

        let mut manager = ResourceManager::new();
        manager.register(Arc::new(StoreResource::new(repo.clone())));
        manager.register(Arc::new(SchedulerResource::new(scheduler.clone())));

        let failed = manager.cleanup_all().await;
        assert!(failed.is_empty());
        assert!(!scheduler.is_running().await);
        assert!(repo.is_closed());
    }

    #[tokio::test]
    async fn test_backfill_is_aborted() {
        let task = tokio::spawn(std::future::pending::<()>());
        let resource = BackfillResource::new(task.abort_handle());

        resource.cleanup().await.unwrap();
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
