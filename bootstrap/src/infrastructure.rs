//! 基础设施资源管理
//!
//! 统一管理服务共享的基础设施资源

use redis::aio::ConnectionManager;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use stockpile_adapter_postgres::{PostgresConfig, create_pool};
use stockpile_adapter_redis::create_connection_manager;
use stockpile_common::{RetryConfig, with_retry};
use stockpile_config::AppConfig;
use stockpile_errors::AppResult;
use tracing::info;

/// 基础设施资源容器
#[derive(Clone)]
pub struct Infrastructure {
    /// 应用配置
    config: AppConfig,
    /// PostgreSQL 连接池
    postgres_pool: PgPool,
    /// Redis 连接管理器（锁存储）
    redis_conn: ConnectionManager,
}

impl Infrastructure {
    /// 从配置创建基础设施资源（带重试）
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        let retry_config = RetryConfig::default();

        let pg_config = PostgresConfig::new(config.database.url.expose_secret())
            .with_max_connections(config.database.max_connections);
        let postgres_pool = with_retry(&retry_config, "PostgreSQL connection", || {
            let cfg = pg_config.clone();
            async move { create_pool(&cfg).await }
        })
        .await?;
        info!(
            max_connections = config.database.max_connections,
            "PostgreSQL connection pool created"
        );

        let redis_url = config.redis.url.clone();
        let redis_conn = with_retry(&retry_config, "Redis connection", || {
            let url = redis_url.expose_secret().clone();
            async move { create_connection_manager(&url).await }
        })
        .await?;
        info!("Redis connection created");

        Ok(Self {
            config,
            postgres_pool,
            redis_conn,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn postgres_pool(&self) -> PgPool {
        self.postgres_pool.clone()
    }

    pub fn redis_connection_manager(&self) -> ConnectionManager {
        self.redis_conn.clone()
    }
}
