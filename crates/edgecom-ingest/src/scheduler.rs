use crate::fetcher::SeriesFetcher;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// 周期拉取参数
#[derive(Debug, Clone, Copy)]
pub struct IngestSchedule {
    /// 触发间隔
    pub interval: Duration,
    /// 单次触发的超时
    pub run_timeout: Duration,
    /// 每次拉取的时间窗口 `[now - window, now)`
    pub window: Duration,
}

impl Default for IngestSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            run_timeout: Duration::from_secs(120),
            window: Duration::from_secs(300),
        }
    }
}

struct SchedulerTask {
    shutdown_tx: watch::Sender<bool>,
    join_handle: JoinHandle<()>,
}

/// 周期拉取调度器
///
/// 每个间隔触发一次拉取，拉取在独立任务中运行，不会推迟下一次触发。
/// 上一次拉取尚未结束时到来的触发会被跳过。
pub struct IngestScheduler {
    fetcher: Arc<SeriesFetcher>,
    schedule: IngestSchedule,
    task: Mutex<Option<SchedulerTask>>,
    in_flight: Arc<AtomicBool>,
    runs: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
}

impl IngestScheduler {
    pub fn new(fetcher: Arc<SeriesFetcher>, schedule: IngestSchedule) -> Self {
        Self {
            fetcher,
            schedule,
            task: Mutex::new(None),
            in_flight: Arc::new(AtomicBool::new(false)),
            runs: Arc::new(AtomicU64::new(0)),
            skipped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 启动周期任务，重复调用无副作用
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("Ingest scheduler already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let fetcher = self.fetcher.clone();
        let schedule = self.schedule;
        let in_flight = self.in_flight.clone();
        let runs = self.runs.clone();
        let skipped = self.skipped.clone();

        let join_handle = tokio::spawn(async move {
            // 首次触发在一个完整间隔之后
            let start = tokio::time::Instant::now() + schedule.interval;
            let mut interval = tokio::time::interval_at(start, schedule.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if in_flight.swap(true, Ordering::SeqCst) {
                            skipped.fetch_add(1, Ordering::SeqCst);
                            warn!("Previous ingest run still in flight, skipping this tick");
                            continue;
                        }

                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::spawn(run_once(fetcher.clone(), schedule, in_flight.clone()));
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Ingest scheduler loop exited");
        });

        *task = Some(SchedulerTask {
            shutdown_tx,
            join_handle,
        });

        info!(
            interval_secs = schedule.interval.as_secs(),
            timeout_secs = schedule.run_timeout.as_secs(),
            "Ingest scheduler started"
        );
    }

    /// 停止后续触发，正在进行的拉取不受影响
    pub async fn stop(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };

        let _ = task.shutdown_tx.send(true);
        if let Err(e) = task.join_handle.await {
            warn!(error = %e, "Ingest scheduler task ended abnormally");
        }

        info!("Ingest scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// 已发起的拉取次数
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    /// 因上一次拉取未结束而跳过的次数
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }
}

/// 离开作用域时清除进行中标记，任务被中止或 panic 时同样生效
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn run_once(fetcher: Arc<SeriesFetcher>, schedule: IngestSchedule, in_flight: Arc<AtomicBool>) {
    let _guard = InFlightGuard(in_flight);

    let end = Utc::now();
    let window = ChronoDuration::from_std(schedule.window).unwrap_or_else(|_| ChronoDuration::minutes(5));
    let start = end - window;

    match tokio::time::timeout(schedule.run_timeout, fetcher.fetch_data(start, end)).await {
        Ok(Ok(count)) => debug!(count = count, "Scheduled fetch completed"),
        Ok(Err(e)) => error!(start = %start, end = %end, error = %e, "Scheduled fetch failed"),
        Err(_) => error!(
            start = %start,
            end = %end,
            timeout_secs = schedule.run_timeout.as_secs(),
            "Scheduled fetch timed out"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_flight_cleared_when_run_is_aborted() {
        let in_flight = Arc::new(AtomicBool::new(true));
        let flag = in_flight.clone();

        let task = tokio::spawn(async move {
            let _guard = InFlightGuard(flag);
            std::future::pending::<()>().await;
        });
        tokio::task::yield_now().await;
        assert!(in_flight.load(Ordering::SeqCst));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_in_flight_cleared_when_run_panics() {
        let in_flight = Arc::new(AtomicBool::new(true));
        let flag = in_flight.clone();

        let task = tokio::spawn(async move {
            let _guard = InFlightGuard(flag);
            panic!("fetch blew up");
        });

        assert!(task.await.unwrap_err().is_panic());
        assert!(!in_flight.load(Ordering::SeqCst));
    }
}
