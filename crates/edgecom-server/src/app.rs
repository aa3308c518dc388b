use crate::api::{create_router, AppState};
use crate::config::AppConfig;
use crate::health::ServingStatus;
use crate::resources::{BackfillResource, SchedulerResource, StoreResource};
use crate::service::TimeSeriesService;
use anyhow::{Context, Result};
use edgecom_ingest::{IngestScheduler, SeriesFetcher};
use edgecom_shutdown::{
    Lifecycle, LifecyclePhase, ResourceManager, ShutdownCoordinator, ShutdownSignal,
    SignalHandler,
};
use edgecom_timeseries::{TimeSeriesRepository, TimescaleRepository};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// 连接存储、绑定端口后运行服务，直到收到关闭信号
pub async fn run(config: AppConfig) -> Result<ShutdownSignal> {
    let repository = TimescaleRepository::connect(&config.database.connection_settings())
        .await
        .context("failed to connect to time-series store")?;
    repository
        .ensure_schema()
        .await
        .context("failed to prepare time-series schema")?;

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    Application::new(config, Arc::new(repository), listener)
        .run()
        .await
}

/// 已就绪的进程组件
///
/// 存储与监听端口由调用方准备，便于测试时替换为内存仓库和随机端口。
pub struct Application {
    config: AppConfig,
    repository: Arc<dyn TimeSeriesRepository>,
    listener: TcpListener,
    signals: SignalHandler,
    lifecycle: Lifecycle,
    system_signals: bool,
}

impl Application {
    pub fn new(
        config: AppConfig,
        repository: Arc<dyn TimeSeriesRepository>,
        listener: TcpListener,
    ) -> Self {
        Self {
            config,
            repository,
            listener,
            signals: SignalHandler::default(),
            lifecycle: Lifecycle::new(),
            system_signals: true,
        }
    }

    pub fn with_signal_handler(mut self, signals: SignalHandler) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// 是否监听 SIGTERM / SIGINT
    pub fn listen_for_system_signals(mut self, enabled: bool) -> Self {
        self.system_signals = enabled;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 启动回填、调度器与监听，等待关闭流程结束后返回触发信号
    pub async fn run(self) -> Result<ShutdownSignal> {
        let Application {
            config,
            repository,
            listener,
            signals,
            lifecycle,
            system_signals,
        } = self;

        // 先订阅，启动阶段的致命错误不会丢失
        let coordinator = ShutdownCoordinator::builder()
            .with_signal_handler(signals.clone())
            .with_lifecycle(lifecycle.clone())
            .with_grace_period(config.grace_period())
            .listen_for_system_signals(system_signals);
        let mut shutdown_rx = signals.subscribe();

        let service = TimeSeriesService::new(repository.clone());
        let state = AppState::from_config(&config, service)
            .context("failed to register request metrics")?;
        let health = state.health.clone();

        let fetcher = Arc::new(
            SeriesFetcher::new(config.server.upstream_url.clone(), repository.clone())
                .with_request_timeout(config.ingest.request_timeout())
                .with_bootstrap_windows(
                    config.ingest.backfill_window(),
                    config.ingest.fallback_window(),
                ),
        );
        let scheduler = Arc::new(IngestScheduler::new(fetcher.clone(), config.ingest.schedule()));

        lifecycle
            .transition(LifecyclePhase::BootstrapPending)
            .context("failed to enter bootstrap phase")?;

        let backfill = {
            let lifecycle = lifecycle.clone();
            let signals = signals.clone();
            tokio::spawn(async move {
                match fetcher.bootstrap_historical_data().await {
                    Ok(()) => {
                        info!("Historical backfill complete");
                        if let Err(e) = lifecycle.transition(LifecyclePhase::Running) {
                            debug!(error = %e, "Backfill finished after shutdown began");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Historical backfill failed");
                        signals.trigger_fatal("historical backfill failed");
                    }
                }
            })
        };

        scheduler.start().await;

        let router = create_router(state);
        let listener_signals = signals.clone();
        let local_addr = listener.local_addr().ok();
        let listener_task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.recv().await;
                health.set_all(ServingStatus::NotServing).await;
                info!("Listener stopped accepting, draining in-flight requests");
            };

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "Listener failed");
                listener_signals.trigger_fatal("listener failed");
            }
        });

        info!(
            addr = ?local_addr,
            upstream = %config.server.upstream_url,
            "EdgeCom time-series service listening"
        );

        let mut resources = ResourceManager::new();
        resources.register(Arc::new(BackfillResource::new(backfill.abort_handle())));
        resources.register(Arc::new(SchedulerResource::new(scheduler)));
        resources.register(Arc::new(StoreResource::new(repository)));

        let signal = coordinator
            .with_resource_manager(resources)
            .with_task("listener", listener_task)
            .build()
            .run()
            .await;

        info!(signal = ?signal, exit_code = signal.exit_code(), "EdgeCom stopped");
        Ok(signal)
    }
}
