use crate::lifecycle::{Lifecycle, LifecyclePhase};
use crate::resource::ResourceManager;
use crate::signal::{ShutdownSignal, SignalHandler};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

/// 关闭协调器
///
/// 等待第一个关闭信号，然后依次：进入 ShuttingDown、在宽限期内排空后台任务
/// （超时则中止）、按优先级清理资源、进入 Stopped。
pub struct ShutdownCoordinator {
    signal_handler: SignalHandler,
    receiver: broadcast::Receiver<ShutdownSignal>,
    lifecycle: Option<Lifecycle>,
    resource_manager: ResourceManager,
    tasks: Vec<(String, JoinHandle<()>)>,
    grace_period: Duration,
    system_signals: bool,
}

impl ShutdownCoordinator {
    pub fn builder() -> ShutdownCoordinatorBuilder {
        ShutdownCoordinatorBuilder::new()
    }

    /// 运行关闭流程，返回触发关闭的信号
    pub async fn run(mut self) -> ShutdownSignal {
        info!("Shutdown coordinator started, waiting for signal");

        let signal = self.wait_for_signal().await;
        info!(signal = ?signal, "Received shutdown signal");

        let start = Instant::now();
        self.enter(LifecyclePhase::ShuttingDown);

        for (name, mut handle) in self.tasks.drain(..) {
            match timeout(self.grace_period, &mut handle).await {
                Ok(Ok(())) => info!(task = %name, "Task drained"),
                Ok(Err(e)) => warn!(task = %name, error = %e, "Task ended abnormally"),
                Err(_) => {
                    warn!(
                        task = %name,
                        grace_period_secs = self.grace_period.as_secs_f64(),
                        "Drain timed out, aborting task"
                    );
                    handle.abort();
                }
            }
        }

        let failed = self.resource_manager.cleanup_all().await;
        if !failed.is_empty() {
            warn!(resources = ?failed, "Some resources failed to clean up");
        }

        self.enter(LifecyclePhase::Stopped);

        info!(elapsed_ms = start.elapsed().as_millis() as u64, "Graceful shutdown complete");
        signal
    }

    /// 获取信号处理器的引用
    pub fn signal_handler(&self) -> &SignalHandler {
        &self.signal_handler
    }

    fn enter(&self, phase: LifecyclePhase) {
        if let Some(lifecycle) = &self.lifecycle {
            if let Err(e) = lifecycle.transition(phase) {
                warn!(error = %e, "Lifecycle transition rejected");
            }
        }
    }

    async fn wait_for_signal(&mut self) -> ShutdownSignal {
        if !self.system_signals {
            return recv_signal(&mut self.receiver).await;
        }

        let handler = self.signal_handler.clone();
        let system = async move {
            match handler.wait_for_system_signal().await {
                Ok(signal) => signal,
                Err(e) => {
                    error!(error = %e, "Failed to install signal handlers");
                    std::future::pending().await
                }
            }
        };

        tokio::select! {
            signal = recv_signal(&mut self.receiver) => signal,
            signal = system => signal,
        }
    }
}

async fn recv_signal(receiver: &mut broadcast::Receiver<ShutdownSignal>) -> ShutdownSignal {
    loop {
        match receiver.recv().await {
            Ok(signal) => return signal,
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped = skipped, "Shutdown receiver lagged");
            }
            Err(RecvError::Closed) => return ShutdownSignal::Manual,
        }
    }
}

/// 关闭协调器构建器
pub struct ShutdownCoordinatorBuilder {
    signal_handler: Option<(SignalHandler, broadcast::Receiver<ShutdownSignal>)>,
    lifecycle: Option<Lifecycle>,
    resource_manager: Option<ResourceManager>,
    tasks: Vec<(String, JoinHandle<()>)>,
    grace_period: Duration,
    system_signals: bool,
}

impl ShutdownCoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            signal_handler: None,
            lifecycle: None,
            resource_manager: None,
            tasks: Vec::new(),
            grace_period: Duration::from_secs(30),
            system_signals: true,
        }
    }

    /// 立即订阅，此后发出的信号不会丢失
    pub fn with_signal_handler(mut self, handler: SignalHandler) -> Self {
        let receiver = handler.subscribe();
        self.signal_handler = Some((handler, receiver));
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn with_resource_manager(mut self, manager: ResourceManager) -> Self {
        self.resource_manager = Some(manager);
        self
    }

    /// 关闭时需要排空的后台任务，按添加顺序等待
    pub fn with_task(mut self, name: impl Into<String>, handle: JoinHandle<()>) -> Self {
        self.tasks.push((name.into(), handle));
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// 是否监听 SIGTERM / SIGINT
    pub fn listen_for_system_signals(mut self, enabled: bool) -> Self {
        self.system_signals = enabled;
        self
    }

    pub fn build(self) -> ShutdownCoordinator {
        let (signal_handler, receiver) = self.signal_handler.unwrap_or_else(|| {
            let handler = SignalHandler::default();
            let receiver = handler.subscribe();
            (handler, receiver)
        });

        ShutdownCoordinator {
            signal_handler,
            receiver,
            lifecycle: self.lifecycle,
            resource_manager: self.resource_manager.unwrap_or_default(),
            tasks: self.tasks,
            grace_period: self.grace_period,
            system_signals: self.system_signals,
        }
    }
}

impl Default for ShutdownCoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, ResourceError};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    struct TestResource {
        name: &'static str,
        priority: u32,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Resource for TestResource {
        async fn cleanup(&self) -> Result<(), ResourceError> {
            self.log.lock().unwrap().push(self.name.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> u32 {
            self.priority
        }
    }

    #[tokio::test]
    async fn test_coordinator_drains_then_cleans_up() {
        let (handler, _rx) = SignalHandler::new();
        let lifecycle = Lifecycle::new();
        lifecycle.transition(LifecyclePhase::BootstrapPending).unwrap();
        lifecycle.transition(LifecyclePhase::Running).unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ResourceManager::new();
        manager.register(Arc::new(TestResource { name: "store", priority: 20, log: log.clone() }));
        manager.register(Arc::new(TestResource { name: "scheduler", priority: 10, log: log.clone() }));

        // 模拟监听任务：收到信号后退出
        let mut listener_rx = handler.subscribe();
        let listener_log = log.clone();
        let listener = tokio::spawn(async move {
            let _ = listener_rx.recv().await;
            listener_log.lock().unwrap().push("listener".to_string());
        });

        let coordinator = ShutdownCoordinator::builder()
            .with_signal_handler(handler.clone())
            .with_lifecycle(lifecycle.clone())
            .with_resource_manager(manager)
            .with_task("listener", listener)
            .listen_for_system_signals(false)
            .build();

        let running = tokio::spawn(coordinator.run());
        handler.trigger_shutdown();

        let signal = running.await.unwrap();
        assert_eq!(signal, ShutdownSignal::Manual);
        assert_eq!(lifecycle.phase(), LifecyclePhase::Stopped);
        assert_eq!(*log.lock().unwrap(), vec!["listener", "scheduler", "store"]);
    }

    #[tokio::test]
    async fn test_signal_sent_before_build_is_delivered() {
        let (handler, _rx) = SignalHandler::new();
        let builder = ShutdownCoordinator::builder()
            .with_signal_handler(handler.clone())
            .listen_for_system_signals(false);

        handler.trigger_shutdown();

        let signal = builder.build().run().await;
        assert_eq!(signal, ShutdownSignal::Manual);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_task_is_aborted_after_grace_period() {
        let (handler, _rx) = SignalHandler::new();
        let (dropped_tx, dropped_rx) = oneshot::channel::<()>();

        let stuck = tokio::spawn(async move {
            let _guard = dropped_tx;
            std::future::pending::<()>().await;
        });

        let coordinator = ShutdownCoordinator::builder()
            .with_signal_handler(handler.clone())
            .with_task("stuck", stuck)
            .with_grace_period(Duration::from_secs(5))
            .listen_for_system_signals(false)
            .build();

        let running = tokio::spawn(coordinator.run());
        handler.trigger_fatal("listener failed");

        let signal = running.await.unwrap();
        assert_eq!(signal, ShutdownSignal::Fatal);
        assert_eq!(signal.exit_code(), 1);

        // 任务被中止后其 future 被丢弃
        assert!(dropped_rx.await.is_err());
    }
}
