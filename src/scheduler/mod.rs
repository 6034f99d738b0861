//! 任务调度适配：把 ScheduledTask 声明映射到 tokio 定时器
//!
//! delay / period 以 tick 计（tick 时长来自配置）。同步任务投递到主上下文串行执行，
//! 异步任务在阻塞线程池执行；两者都经过失败隔离，单次失败不会停止重复任务。
//! 调度器保留全部句柄，仅用于关闭或热重载时统一取消。

pub mod primary;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::capability::{CapabilitySpec, CapabilityTable, ScheduleSpec, TaskHandler};
use crate::core::isolation::invoke_isolated;

pub use primary::PrimaryContext;

/// 默认 tick 时长（毫秒）
pub const DEFAULT_TICK_MILLIS: u64 = 50;

/// 任务 ID
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskId {
    pub fn new() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// 已调度任务的句柄
#[derive(Clone, Debug)]
pub struct TaskHandle {
    id: TaskId,
    name: String,
    token: CancellationToken,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 取消后不会再开始新的调用；正在执行的调用会跑完
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// 单个任务的执行体
#[derive(Clone)]
struct TaskRunner {
    name: String,
    handler: TaskHandler,
    is_async: bool,
    primary: PrimaryContext,
    token: CancellationToken,
}

impl TaskRunner {
    async fn run_once(&self) {
        let runner = self.clone();
        let job = move || {
            // 排队期间被取消的调用直接丢弃
            if runner.token.is_cancelled() {
                return;
            }
            let _ = invoke_isolated(&runner.name, || (runner.handler)());
        };

        if self.is_async {
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                tracing::error!("Async task '{}' join error: {}", self.name, e);
            }
        } else if self.primary.run(job).await.is_none() {
            tracing::warn!("Primary context unavailable, task '{}' skipped", self.name);
        }
    }
}

/// 任务调度器（必须在 tokio 运行时内使用）
pub struct TaskScheduler {
    primary: PrimaryContext,
    tick: Duration,
    tasks: DashMap<TaskId, TaskHandle>,
}

impl TaskScheduler {
    pub fn new(primary: PrimaryContext, tick_millis: u64) -> Self {
        Self {
            primary,
            tick: Duration::from_millis(tick_millis.max(1)),
            tasks: DashMap::new(),
        }
    }

    pub fn primary(&self) -> &PrimaryContext {
        &self.primary
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    fn ticks(&self, n: u64) -> Duration {
        self.tick.saturating_mul(u32::try_from(n).unwrap_or(u32::MAX))
    }

    /// 调度单个任务
    pub fn schedule(&self, name: &str, handler: TaskHandler, spec: ScheduleSpec) -> TaskHandle {
        let handle = TaskHandle {
            id: TaskId::new(),
            name: name.to_string(),
            token: CancellationToken::new(),
        };
        let token = handle.token.clone();
        let runner = TaskRunner {
            name: name.to_string(),
            handler,
            is_async: spec.is_async,
            primary: self.primary.clone(),
            token: token.clone(),
        };
        let delay = self.ticks(spec.delay);
        let period = spec.is_repeating().then(|| self.ticks(spec.period as u64));

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = time::sleep(delay) => {}
            }

            let Some(period) = period else {
                runner.run_once().await;
                return;
            };

            // 首次在 delay 之后立即执行，随后每 period 一次
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => runner.run_once().await,
                }
            }
            tracing::debug!("Repeating task '{}' stopped", runner.name);
        });

        tracing::info!(
            "Scheduled task: {} (delay={}, period={}, async={})",
            name,
            spec.delay,
            spec.period,
            spec.is_async
        );
        self.tasks.insert(handle.id, handle.clone());
        handle
    }

    /// 调度能力表中的全部 ScheduledTask
    pub fn schedule_all(&self, table: &CapabilityTable) -> usize {
        let mut count = 0;
        for descriptor in table {
            if let CapabilitySpec::ScheduledTask { schedule, handler } = &descriptor.spec {
                self.schedule(&descriptor.name, Arc::clone(handler), *schedule);
                count += 1;
            }
        }
        count
    }

    /// 取消单个任务
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.tasks.remove(&id) {
            Some((_, handle)) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// 取消全部任务并清空；可重复调用
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        self.tasks.retain(|_, handle| {
            handle.cancel();
            cancelled += 1;
            false
        });
        if cancelled > 0 {
            tracing::info!("Cancelled {} scheduled tasks", cancelled);
        }
        cancelled
    }

    /// 当前持有的任务句柄数量（含已完成的一次性任务）
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::capability::CapabilityDescriptor;

    fn counter_handler(counter: &Arc<AtomicUsize>) -> TaskHandler {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn scheduler() -> TaskScheduler {
        let (primary, _handle) = PrimaryContext::spawn();
        TaskScheduler::new(primary, 10)
    }

    #[tokio::test]
    async fn test_one_shot_runs_once() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.schedule("once", counter_handler(&counter), ScheduleSpec::once(2));

        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.active_count(), 1);
    }

    #[tokio::test]
    async fn test_repeating_until_cancelled() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle =
            scheduler.schedule("repeat", counter_handler(&counter), ScheduleSpec::repeating(0, 2));

        time::sleep(Duration::from_millis(150)).await;
        handle.cancel();
        let seen = counter.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected repeated runs, got {seen}");

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_cancel_before_delay() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.schedule("late", counter_handler(&counter), ScheduleSpec::once(20));
        assert!(scheduler.cancel(handle.id()));
        assert!(handle.is_cancelled());
        assert!(!scheduler.cancel(handle.id()));

        time::sleep(Duration::from_millis(300)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_repeating_task() {
        let scheduler = scheduler();
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        scheduler.schedule(
            "flaky",
            Arc::new(move || -> anyhow::Result<()> {
                if seen.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                    anyhow::bail!("even attempt");
                }
                panic!("odd attempt");
            }),
            ScheduleSpec::repeating(0, 1).asynchronous(),
        );

        time::sleep(Duration::from_millis(150)).await;
        assert!(attempts.load(Ordering::SeqCst) >= 3);
        assert_eq!(scheduler.cancel_all(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sync_tasks_share_primary_path_async_tasks_do_not() {
        let scheduler = scheduler();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = |tag: &'static str| -> TaskHandler {
            let log = Arc::clone(&log);
            Arc::new(move || -> anyhow::Result<()> {
                log.lock().unwrap().push(tag);
                Ok(())
            })
        };

        // 先占住主上下文，直到测试放行
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let blocker_log = Arc::clone(&log);
        assert!(scheduler.primary().post(move || {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
            blocker_log.lock().unwrap().push("primary-job");
        }));

        scheduler.schedule("sync", recorder("sync-task"), ScheduleSpec::once(0));
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let async_log = Arc::clone(&log);
        let done_tx = std::sync::Mutex::new(Some(done_tx));
        scheduler.schedule(
            "async",
            Arc::new(move || -> anyhow::Result<()> {
                async_log.lock().unwrap().push("async-task");
                if let Some(tx) = done_tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
                Ok(())
            }),
            ScheduleSpec::once(0).asynchronous(),
        );

        // 主上下文被占用时，异步任务照常执行，同步任务只能排队
        time::timeout(Duration::from_secs(2), done_rx)
            .await
            .expect("async task ran while the primary context was busy")
            .unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*log.lock().unwrap(), vec!["async-task"]);

        release_tx.send(()).unwrap();
        time::timeout(Duration::from_secs(2), async {
            while log.lock().unwrap().len() < 3 {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("sync task ran after the primary job");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["async-task", "primary-job", "sync-task"]
        );
    }

    #[tokio::test]
    async fn test_schedule_all_and_cancel_all_idempotent() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&counter);
        let c2 = Arc::clone(&counter);
        let table = CapabilityTable::new()
            .with(CapabilityDescriptor::task("a", ScheduleSpec::repeating(50, 50), move || {
                c1.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .with(CapabilityDescriptor::task(
                "b",
                ScheduleSpec::once(50).asynchronous(),
                move || {
                    c2.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            ))
            .with(CapabilityDescriptor::menu("ignored", "Menu", 1));

        assert_eq!(scheduler.schedule_all(&table), 2);
        assert_eq!(scheduler.active_count(), 2);
        assert_eq!(scheduler.cancel_all(), 2);
        assert_eq!(scheduler.cancel_all(), 0);

        time::sleep(Duration::from_millis(700)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
