//! 主执行上下文：单个 tokio 任务按提交顺序逐个执行作业，模拟宿主的单线程 tick 路径
//!
//! 作业必须短小（不得做长 I/O 或无界循环）；作业内的 panic 被隔离，不会终止主循环。

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::core::isolation::invoke_isolated;

pub type PrimaryJob = Box<dyn FnOnce() + Send + 'static>;

/// 主上下文句柄（可克隆，所有克隆共享同一个队列）
#[derive(Clone, Debug)]
pub struct PrimaryContext {
    tx: mpsc::UnboundedSender<PrimaryJob>,
}

impl PrimaryContext {
    /// 启动主循环；所有句柄被丢弃后循环结束。必须在 tokio 运行时内调用。
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<PrimaryJob>();
        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let _ = invoke_isolated("primary-job", || {
                    job();
                    Ok(())
                });
            }
            tracing::debug!("Primary context stopped");
        });
        (Self { tx }, handle)
    }

    /// 投递作业，不等待；主循环已停止时返回 false
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }

    /// 投递作业并等待其结果；作业 panic 或主循环已停止时返回 None
    pub async fn run<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if !self.post(move || {
            let _ = tx.send(f());
        }) {
            return None;
        }
        rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let (primary, _handle) = PrimaryContext::spawn();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let log = Arc::clone(&log);
            assert!(primary.post(move || log.lock().unwrap().push(i)));
        }
        let len = primary.run({
            let log = Arc::clone(&log);
            move || log.lock().unwrap().len()
        });
        assert_eq!(len.await, Some(10));
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_loop() {
        let (primary, _handle) = PrimaryContext::spawn();
        assert_eq!(primary.run(|| -> u8 { panic!("job panic") }).await, None);
        assert_eq!(primary.run(|| 7).await, Some(7));
    }
}
