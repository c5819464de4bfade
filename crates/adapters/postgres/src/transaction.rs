//! PostgreSQL 事务管理模块

use sqlx::{PgPool, Postgres, Transaction};
use stockpile_errors::AppResult;
use tracing::debug;

use crate::map_sqlx_error;

/// 事务隔离级别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    /// 读已提交（PostgreSQL 默认）
    #[default]
    ReadCommitted,
    /// 可重复读
    RepeatableRead,
    /// 可串行化
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// 事务选项
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    pub isolation_level: IsolationLevel,
    /// 语句超时，单位毫秒
    pub statement_timeout_ms: Option<u64>,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn with_statement_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.statement_timeout_ms = Some(timeout_ms);
        self
    }

    /// 生成事务开始后需要执行的语句
    pub fn to_statements(&self) -> Vec<String> {
        let mut statements = vec![format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            self.isolation_level.as_sql()
        )];
        if let Some(timeout) = self.statement_timeout_ms {
            statements.push(format!("SET LOCAL statement_timeout = {}", timeout));
        }
        statements
    }
}

/// 事务管理器
#[derive(Clone)]
pub struct TransactionManager {
    pool: PgPool,
}

impl TransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 开始事务，事务在其生命周期内固定占用一个连接
    pub async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(map_sqlx_error)
    }

    /// 开始带选项的事务
    pub async fn begin_with_options(
        &self,
        options: &TransactionOptions,
    ) -> AppResult<Transaction<'static, Postgres>> {
        let mut tx = self.begin().await?;

        for statement in options.to_statements() {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        debug!(isolation = options.isolation_level.as_sql(), "Transaction started");
        Ok(tx)
    }
}
