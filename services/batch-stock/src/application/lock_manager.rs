//! 分布式锁管理
//!
//! 多把锁按名称字典序获取，释放时逆序。每次获取写入随机令牌，
//! 释放与续期都校验令牌，过期后的旧持有者不会误删后继者的锁。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use stockpile_config::LockConfig;
use stockpile_ports::DistributedLock;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BatchError, BatchResult};

/// 已持有的锁
#[derive(Debug, Clone)]
pub struct HeldLock {
    name: String,
    key: String,
    token: String,
    acquired_at: Instant,
}

impl HeldLock {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 锁管理器
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn DistributedLock>,
    ttl: Duration,
    wait_timeout: Duration,
    retry_interval: Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn DistributedLock>, config: &LockConfig) -> Self {
        Self {
            store,
            ttl: config.ttl(),
            wait_timeout: config.wait_timeout(),
            retry_interval: config.retry_interval(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key_for(name: &str) -> String {
        format!("lock:{}", name)
    }

    /// 获取单把锁，被占用时按间隔重试直到截止时间
    pub async fn acquire(&self, name: &str, deadline: Instant) -> BatchResult<HeldLock> {
        let key = Self::key_for(name);
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();

        loop {
            // TTL 自发出 SET 起计算
            let attempt_at = Instant::now();
            if self.store.try_acquire(&key, &token, self.ttl).await? {
                histogram!("batch_stock_lock_wait_seconds").record(started.elapsed().as_secs_f64());
                debug!(lock = %name, "Lock acquired");
                return Ok(HeldLock {
                    name: name.to_string(),
                    key,
                    token,
                    acquired_at: attempt_at,
                });
            }

            counter!("batch_stock_lock_contention_total").increment(1);
            let now = Instant::now();
            if now >= deadline {
                warn!(lock = %name, waited_ms = started.elapsed().as_millis() as u64, "Lock wait deadline reached");
                return Err(BatchError::LockUnavailable {
                    name: name.to_string(),
                });
            }
            tokio::time::sleep(self.retry_interval.min(deadline - now)).await;
        }
    }

    /// 释放单把锁，重复释放无副作用
    pub async fn release(&self, lock: &HeldLock) -> BatchResult<()> {
        release_held(self.store.as_ref(), lock).await
    }

    /// 按字典序获取一组锁；任一失败时释放本次已获取的锁
    pub async fn acquire_all<I>(&self, names: I) -> BatchResult<LockSet>
    where
        I: IntoIterator<Item = String>,
    {
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        names.dedup();

        let deadline = Instant::now() + self.wait_timeout;
        let mut set = LockSet::new(self.store.clone(), self.ttl);
        for name in &names {
            match self.acquire(name, deadline).await {
                Ok(lock) => set.held.push(lock),
                Err(e) => {
                    set.release().await;
                    return Err(e);
                }
            }
        }
        Ok(set)
    }

    /// 持锁执行，任何退出路径都会释放
    pub async fn run_under_lock<T, F, Fut>(&self, name: &str, f: F) -> BatchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BatchResult<T>>,
    {
        let set = self.acquire_all([name.to_string()]).await?;
        let result = f().await;
        set.release().await;
        result
    }
}

async fn release_held(store: &dyn DistributedLock, lock: &HeldLock) -> BatchResult<()> {
    let released = store.release(&lock.key, &lock.token).await?;
    if !released {
        warn!(lock = %lock.name, "Lock already expired or taken over before release");
    }
    Ok(())
}

/// 一次调用持有的全部锁
///
/// 未显式释放就被丢弃时（如请求被取消），在后台任务中释放
pub struct LockSet {
    store: Arc<dyn DistributedLock>,
    ttl: Duration,
    held: Vec<HeldLock>,
    released: bool,
}

impl LockSet {
    fn new(store: Arc<dyn DistributedLock>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            held: Vec::new(),
            released: false,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.held.iter().map(HeldLock::name).collect()
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// 以最早获取的锁计算剩余 TTL
    pub fn remaining_ttl(&self) -> Duration {
        self.held
            .iter()
            .map(|lock| lock.acquired_at)
            .min()
            .map(|earliest| self.ttl.saturating_sub(earliest.elapsed()))
            .unwrap_or(self.ttl)
    }

    /// 剩余 TTL 低于 `margin` 时续期全部锁，返回是否续期
    pub async fn refresh_if_needed(&mut self, margin: Duration) -> BatchResult<bool> {
        if self.held.is_empty() || self.remaining_ttl() >= margin {
            return Ok(false);
        }
        self.extend().await?;
        Ok(true)
    }

    /// 续期全部锁，任一锁已不属于本调用时返回 `LOCK_UNAVAILABLE`
    pub async fn extend(&mut self) -> BatchResult<()> {
        for lock in &mut self.held {
            let attempt_at = Instant::now();
            if !self.store.extend(&lock.key, &lock.token, self.ttl).await? {
                warn!(lock = %lock.name, "Lock ownership lost before extension");
                return Err(BatchError::LockUnavailable {
                    name: lock.name.clone(),
                });
            }
            lock.acquired_at = attempt_at;
        }
        debug!(locks = self.held.len(), "Locks extended");
        Ok(())
    }

    /// 逆序释放全部锁，单把锁释放失败只记录日志
    pub async fn release(mut self) {
        self.released = true;
        let held = std::mem::take(&mut self.held);
        release_in_reverse(self.store.as_ref(), held).await;
    }
}

async fn release_in_reverse(store: &dyn DistributedLock, held: Vec<HeldLock>) {
    for lock in held.iter().rev() {
        if let Err(e) = release_held(store, lock).await {
            warn!(lock = %lock.name, error = %e, "Failed to release lock");
        }
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        if self.released || self.held.is_empty() {
            return;
        }
        let held = std::mem::take(&mut self.held);
        let store = self.store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    release_in_reverse(store.as_ref(), held).await;
                });
            }
            Err(_) => warn!(
                locks = held.len(),
                "Lock set dropped outside a runtime, keys will expire by TTL"
            ),
        }
    }
}
