//! 冷却追踪
//!
//! 以 (桶名, 行为者) 为键记录最近一次成功使用的时刻。存储是分片并发表（DashMap），
//! 不同行为者 / 桶之间互不串行化；剩余时间总是从一次原子读取到的时刻推导，不会读到撕裂值。
//! 时间源使用 tokio::time::Instant，测试中可暂停并推进时钟。

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::host::ActorId;

/// 未指定桶名时使用的默认桶
pub const DEFAULT_BUCKET: &str = "default";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CooldownKey {
    bucket: String,
    actor: ActorId,
}

impl CooldownKey {
    fn new(bucket: &str, actor: ActorId) -> Self {
        Self {
            bucket: bucket.to_string(),
            actor,
        }
    }
}

/// 冷却追踪器；所有方法都可被任意数量的并发调用方直接使用，无需外部加锁
#[derive(Debug, Default)]
pub struct CooldownTracker {
    entries: DashMap<CooldownKey, Instant>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 存在上次使用记录且距今严格小于 duration 时处于冷却中
    pub fn is_on_cooldown(&self, bucket: &str, actor: ActorId, duration: Duration) -> bool {
        self.remaining(bucket, actor, duration) > 0
    }

    /// 记录一次成功使用（覆盖旧值）
    pub fn set(&self, bucket: &str, actor: ActorId) {
        self.entries.insert(CooldownKey::new(bucket, actor), Instant::now());
    }

    /// 剩余整秒数（向上取整）；不在冷却中时为 0
    pub fn remaining(&self, bucket: &str, actor: ActorId, duration: Duration) -> u64 {
        let last = self
            .entries
            .get(&CooldownKey::new(bucket, actor))
            .map(|entry| *entry.value());
        match last {
            Some(last) => remaining_secs(last, Instant::now(), duration),
            None => 0,
        }
    }

    /// 原子地“检查并占用”：不在冷却中则记为现在并返回 Ok，否则返回剩余秒数且不改动记录
    pub fn try_acquire(&self, bucket: &str, actor: ActorId, duration: Duration) -> Result<(), u64> {
        let now = Instant::now();
        match self.entries.entry(CooldownKey::new(bucket, actor)) {
            Entry::Occupied(mut entry) => {
                let remaining = remaining_secs(*entry.get(), now, duration);
                if remaining > 0 {
                    return Err(remaining);
                }
                entry.insert(now);
                Ok(())
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                Ok(())
            }
        }
    }

    pub fn reset(&self, bucket: &str, actor: ActorId) {
        self.entries.remove(&CooldownKey::new(bucket, actor));
    }

    /// 清除某行为者在所有桶中的记录
    pub fn reset_all(&self, actor: ActorId) {
        self.entries.retain(|key, _| key.actor != actor);
    }

    /// 清理早于 max_age 的记录，返回清理数量
    pub fn sweep(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, last| {
            let keep = now.saturating_duration_since(*last) < max_age;
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            tracing::debug!("Swept {} expired cooldown entries", removed);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn remaining_secs(last: Instant, now: Instant, duration: Duration) -> u64 {
    let elapsed = now.saturating_duration_since(last);
    if elapsed >= duration {
        return 0;
    }
    let left = duration - elapsed;
    if left.subsec_nanos() > 0 {
        left.as_secs() + 1
    } else {
        left.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TEN: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn test_fresh_cooldown() {
        let tracker = CooldownTracker::new();
        let actor = ActorId::new();
        assert!(!tracker.is_on_cooldown("heal", actor, TEN));
        assert_eq!(tracker.remaining("heal", actor, TEN), 0);

        tracker.set("heal", actor);
        assert!(tracker.is_on_cooldown("heal", actor, TEN));
        let remaining = tracker.remaining("heal", actor, TEN);
        assert!(remaining > 0 && remaining <= 10);
        assert!(tracker.is_on_cooldown("heal", actor, Duration::from_millis(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down_to_zero() {
        let tracker = CooldownTracker::new();
        let actor = ActorId::new();
        tracker.set("heal", actor);

        let mut previous = tracker.remaining("heal", actor, TEN);
        for _ in 0..19 {
            tokio::time::advance(Duration::from_millis(500)).await;
            let now = tracker.remaining("heal", actor, TEN);
            assert!(now <= previous);
            assert_eq!(now > 0, tracker.is_on_cooldown("heal", actor, TEN));
            previous = now;
        }
        assert_eq!(previous, 1);

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(tracker.remaining("heal", actor, TEN), 0);
        assert!(!tracker.is_on_cooldown("heal", actor, TEN));
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire() {
        let tracker = CooldownTracker::new();
        let actor = ActorId::new();
        assert_eq!(tracker.try_acquire("kit", actor, TEN), Ok(()));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(tracker.try_acquire("kit", actor, TEN), Err(7));

        // 冷却中的失败尝试不会刷新记录
        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(tracker.try_acquire("kit", actor, TEN), Ok(()));
        assert!(tracker.is_on_cooldown("kit", actor, TEN));
    }

    #[tokio::test(start_paused = true)]
    async fn test_buckets_and_actors_are_independent() {
        let tracker = CooldownTracker::new();
        let alice = ActorId::new();
        let bob = ActorId::new();
        tracker.set("heal", alice);
        tracker.set("feed", alice);
        tracker.set("heal", bob);

        tracker.reset("heal", alice);
        assert!(!tracker.is_on_cooldown("heal", alice, TEN));
        assert!(tracker.is_on_cooldown("feed", alice, TEN));
        assert!(tracker.is_on_cooldown("heal", bob, TEN));

        tracker.reset_all(alice);
        assert!(!tracker.is_on_cooldown("feed", alice, TEN));
        assert!(tracker.is_on_cooldown("heal", bob, TEN));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_old_entries() {
        let tracker = CooldownTracker::new();
        let old = ActorId::new();
        let fresh = ActorId::new();
        tracker.set(DEFAULT_BUCKET, old);
        tokio::time::advance(Duration::from_secs(60)).await;
        tracker.set(DEFAULT_BUCKET, fresh);

        assert_eq!(tracker.sweep(Duration::from_secs(30)), 1);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.is_on_cooldown(DEFAULT_BUCKET, fresh, TEN));

        tracker.clear();
        assert!(tracker.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_grants_once() {
        let tracker = Arc::new(CooldownTracker::new());
        let actor = ActorId::new();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                tracker.try_acquire("heal", actor, Duration::from_secs(60)).is_ok()
            }));
        }
        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }
}
