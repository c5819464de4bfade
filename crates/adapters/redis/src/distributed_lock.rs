//! Redis 分布式锁实现

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use std::time::Duration;
use stockpile_errors::{AppError, AppResult};
use stockpile_ports::DistributedLock;
use tracing::debug;

/// 仅当值匹配时删除
const RELEASE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
";

/// 仅当值匹配时续期
const EXTEND_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
";

/// Redis 分布式锁
///
/// 获取使用 `SET key token NX PX ttl`，单条命令完成检查与写入。
#[derive(Clone)]
pub struct RedisDistributedLock {
    conn: ConnectionManager,
}

impl RedisDistributedLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl DistributedLock for RedisDistributedLock {
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::external_service(format!("Redis lock acquire failed: {}", e)))?;

        debug!(key = %key, acquired = result.is_some(), "Lock acquire attempt");
        Ok(result.is_some())
    }

    async fn release(&self, key: &str, token: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();

        let deleted: i64 = Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::external_service(format!("Redis lock release failed: {}", e)))?;

        Ok(deleted > 0)
    }

    async fn extend(&self, key: &str, token: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.conn.clone();

        let extended: i64 = Script::new(EXTEND_SCRIPT)
            .key(key)
            .arg(token)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::external_service(format!("Redis lock extend failed: {}", e)))?;

        Ok(extended > 0)
    }
}
