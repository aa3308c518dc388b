use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

/// 进程生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Starting,
    BootstrapPending,
    Running,
    ShuttingDown,
    Stopped,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Starting => "starting",
            LifecyclePhase::BootstrapPending => "bootstrap_pending",
            LifecyclePhase::Running => "running",
            LifecyclePhase::ShuttingDown => "shutting_down",
            LifecyclePhase::Stopped => "stopped",
        }
    }

    /// 合法的状态迁移
    pub fn can_transition_to(&self, next: LifecyclePhase) -> bool {
        use LifecyclePhase::*;

        matches!(
            (self, next),
            (Starting, BootstrapPending)
                | (BootstrapPending, Running)
                | (Starting, ShuttingDown)
                | (BootstrapPending, ShuttingDown)
                | (Running, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: LifecyclePhase,
        to: LifecyclePhase,
    },
}

/// 生命周期状态跟踪，克隆后共享同一状态
#[derive(Clone)]
pub struct Lifecycle {
    phase_tx: Arc<watch::Sender<LifecyclePhase>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (phase_tx, _) = watch::channel(LifecyclePhase::Starting);
        Self {
            phase_tx: Arc::new(phase_tx),
        }
    }

    /// 当前阶段
    pub fn phase(&self) -> LifecyclePhase {
        *self.phase_tx.borrow()
    }

    /// 迁移到下一阶段，非法迁移时状态保持不变
    pub fn transition(&self, next: LifecyclePhase) -> Result<(), LifecycleError> {
        let mut result = Ok(());

        self.phase_tx.send_if_modified(|phase| {
            if phase.can_transition_to(next) {
                info!(from = %phase, to = %next, "Lifecycle transition");
                *phase = next;
                true
            } else {
                result = Err(LifecycleError::InvalidTransition {
                    from: *phase,
                    to: next,
                });
                false
            }
        });

        result
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecyclePhase> {
        self.phase_tx.subscribe()
    }

    /// 等待进入指定阶段
    pub async fn wait_for(&self, target: LifecyclePhase) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|phase| *phase == target).await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
