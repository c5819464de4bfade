//! Batch Stock Service - 批次库存服务入口

use std::sync::Arc;
use std::time::Duration;

use batch_stock::api::http::{AppState, router};
use batch_stock::application::{BatchStockService, LockManager, UnitConverter};
use batch_stock::infrastructure::persistence::{
    PostgresBatchQueryRepository, PostgresRecipeRepository, PostgresStockTransactionFactory,
    PostgresUnitRepository,
};
use stockpile_adapter_postgres::{TransactionManager, TransactionOptions};
use stockpile_adapter_redis::RedisDistributedLock;
use stockpile_bootstrap::{Infrastructure, run_http};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    run_http("config", |infra: Infrastructure| async move {
        info!("Initializing batch stock service...");

        let pool = infra.postgres_pool();
        let config = infra.config();

        // 单位换算缓存预热
        let converter = UnitConverter::new(Arc::new(PostgresUnitRepository::new(pool.clone())));
        converter.warm_up().await?;

        // 分布式锁
        let lock_store = Arc::new(RedisDistributedLock::new(infra.redis_connection_manager()));
        let locks = LockManager::new(lock_store, &config.locks);

        // 语句超时不超过锁 TTL 的一半，事务不会长于锁
        let statement_timeout_ms = (config.locks.ttl().as_millis() / 2) as u64;
        let transactions = Arc::new(PostgresStockTransactionFactory::new(
            TransactionManager::new(pool.clone()),
            TransactionOptions::new().with_statement_timeout_ms(statement_timeout_ms),
        ));

        let service = Arc::new(BatchStockService::new(
            transactions,
            Arc::new(PostgresBatchQueryRepository::new(pool.clone())),
            Arc::new(PostgresRecipeRepository::new(pool)),
            converter,
            locks,
            Duration::from_secs(config.locks.refresh_margin_secs),
            config.pagination.clone(),
        ));

        info!("Batch stock service initialized");
        Ok(router(AppState::new(service)))
    })
    .await
}
