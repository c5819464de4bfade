//! 分布式锁 trait 定义

use async_trait::async_trait;
use stockpile_errors::AppResult;
use std::time::Duration;

/// 分布式锁存储
///
/// 每次获取都携带调用方生成的 `token`，释放与续期只对持有相同 token 的键生效，
/// 过期后被他人重新获取的锁不会被误删。
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// 原子地“不存在则写入并设置 TTL”，返回是否获取成功
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> AppResult<bool>;

    /// 释放锁（幂等），返回键是否由本 token 持有并被删除
    async fn release(&self, key: &str, token: &str) -> AppResult<bool>;

    /// 续期，返回 false 表示锁已不再由本 token 持有
    async fn extend(&self, key: &str, token: &str, ttl: Duration) -> AppResult<bool>;
}
