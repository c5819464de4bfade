//! PostgreSQL 库存事务实现
//!
//! 批次行以 `FOR UPDATE` 读取；更新、新建与流水插入各为一条分组语句

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Postgres, QueryBuilder, Transaction};
use stockpile_adapter_postgres::{TransactionManager, TransactionOptions, map_sqlx_error};
use stockpile_errors::{AppError, AppResult};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{
    ApplyReport, AuditCommand, BatchBase, BatchCreate, BatchUpdate, BulkUpdateInfo,
    BulkUpdateQuery, Scope, StockTransaction, StockTransactionFactory, UnitOfWork, VariantMeta,
};

/// 每条语句最多携带的行数，避免超出绑定参数上限
const ROWS_PER_STATEMENT: usize = 1_000;

/// Postgres 库存事务工厂
pub struct PostgresStockTransactionFactory {
    manager: TransactionManager,
    options: TransactionOptions,
}

impl PostgresStockTransactionFactory {
    pub fn new(manager: TransactionManager, options: TransactionOptions) -> Self {
        Self { manager, options }
    }
}

#[async_trait]
impl StockTransactionFactory for PostgresStockTransactionFactory {
    async fn begin(&self) -> AppResult<Box<dyn StockTransaction>> {
        let tx = self.manager.begin_with_options(&self.options).await?;
        Ok(Box::new(PostgresStockTransaction::new(tx)))
    }
}

/// Postgres 库存事务
pub struct PostgresStockTransaction {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PostgresStockTransaction {
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }
}

#[derive(sqlx::FromRow)]
struct BatchRow {
    id: i64,
    sku: String,
    quantity: Decimal,
    unit_id: i64,
    expires_at: NaiveDate,
}

impl From<BatchRow> for BatchBase {
    fn from(row: BatchRow) -> Self {
        Self {
            id: row.id,
            sku: row.sku,
            quantity: row.quantity,
            unit_id: row.unit_id,
            expires_at: row.expires_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    sku: String,
    standard_unit_id: i64,
    cost: Decimal,
    shelf_life_days: i32,
}

impl From<VariantRow> for VariantMeta {
    fn from(row: VariantRow) -> Self {
        Self {
            sku: row.sku,
            standard_unit_id: row.standard_unit_id,
            cost: row.cost,
            shelf_life_days: row.shelf_life_days,
        }
    }
}

#[async_trait]
impl StockTransaction for PostgresStockTransaction {
    async fn load_bulk_update_info(
        &self,
        scope: &Scope,
        query: &BulkUpdateQuery,
    ) -> AppResult<BulkUpdateInfo> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let mut info = BulkUpdateInfo::default();

        if !query.batch_ids.is_empty() {
            let sql = format!(
                "SELECT id, sku, quantity, unit_id, expires_at FROM {} \
                 WHERE {} = $1 AND id = ANY($2) AND sku = ANY($3) \
                 ORDER BY id FOR UPDATE",
                scope.batch_table(),
                scope.owner_column()
            );
            let rows = sqlx::query_as::<_, BatchRow>(&sql)
                .bind(scope.owner_id())
                .bind(&query.batch_ids)
                .bind(&query.skus)
                .fetch_all(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;
            info.batches = rows
                .into_iter()
                .map(|row| (row.id, BatchBase::from(row)))
                .collect();
        }

        let variants = sqlx::query_as::<_, VariantRow>(
            r#"
            SELECT sku, unit_id AS standard_unit_id, cost, shelf_life_days
            FROM product_variants
            WHERE sku = ANY($1)
            "#,
        )
        .bind(&query.skus)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
        info.variants = variants
            .into_iter()
            .map(|row| (row.sku.clone(), VariantMeta::from(row)))
            .collect();

        if !query.ingredient_skus.is_empty() {
            let sql = format!(
                "SELECT id, sku, quantity, unit_id, expires_at FROM {} \
                 WHERE {} = $1 AND sku = ANY($2) \
                 ORDER BY sku, expires_at, id FOR UPDATE",
                scope.batch_table(),
                scope.owner_column()
            );
            let rows = sqlx::query_as::<_, BatchRow>(&sql)
                .bind(scope.owner_id())
                .bind(&query.ingredient_skus)
                .fetch_all(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;
            let mut by_sku: HashMap<String, Vec<BatchBase>> = HashMap::new();
            for row in rows {
                by_sku
                    .entry(row.sku.clone())
                    .or_default()
                    .push(BatchBase::from(row));
            }
            info.ingredient_batches = by_sku;
        }

        debug!(
            scope = %scope,
            batches = info.batches.len(),
            variants = info.variants.len(),
            "Bulk update info loaded"
        );
        Ok(info)
    }

    async fn apply(&self, scope: &Scope, plan: &UnitOfWork) -> AppResult<ApplyReport> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| AppError::internal("Transaction consumed"))?;

        let mut report = ApplyReport::default();

        let updates: Vec<&BatchUpdate> = plan.updates().collect();
        for chunk in updates.chunks(ROWS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Postgres>::new(format!(
                "UPDATE {} AS b SET quantity = v.quantity, updated_at = NOW() FROM (",
                scope.batch_table()
            ));
            builder.push_values(chunk, |mut row, update| {
                row.push_bind(update.batch_id)
                    .push_bind(update.new_quantity);
            });
            builder
                .push(") AS v(id, quantity) WHERE b.id = v.id AND b.")
                .push(scope.owner_column())
                .push(" = ")
                .push_bind(scope.owner_id())
                .push(" RETURNING b.id");

            let ids: Vec<i64> = builder
                .build_query_scalar()
                .fetch_all(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;
            report.updated_ids.extend(ids);
        }

        let creates: Vec<&BatchCreate> = plan.creates().collect();
        for chunk in creates.chunks(ROWS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {} ({}, sku, quantity, unit_id, expires_at) ",
                scope.batch_table(),
                scope.owner_column()
            ));
            builder.push_values(chunk, |mut row, create| {
                row.push_bind(scope.owner_id())
                    .push_bind(create.sku.clone())
                    .push_bind(create.quantity)
                    .push_bind(create.unit_id)
                    .push_bind(create.expires_at);
            });
            builder.push(" RETURNING id");

            let ids: Vec<i64> = builder
                .build_query_scalar()
                .fetch_all(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;
            report.created_ids.extend(ids);
        }

        for chunk in plan.audit_commands.chunks(ROWS_PER_STATEMENT) {
            report.audit_rows += insert_audit_rows(tx, scope, chunk).await?;
        }

        debug!(
            scope = %scope,
            updated = report.updated_ids.len(),
            created = report.created_ids.len(),
            audits = report.audit_rows,
            "Unit of work written"
        );
        Ok(report)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit transaction: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;

        tx.rollback()
            .await
            .map_err(|e| AppError::database(format!("Failed to rollback transaction: {}", e)))
    }
}

/// 流水插入与批次写入共用同一事务，不单独开启事务
async fn insert_audit_rows(
    tx: &mut Transaction<'static, Postgres>,
    scope: &Scope,
    commands: &[AuditCommand],
) -> AppResult<u64> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "INSERT INTO {} ({}, batch_id, sku, unit_id, quantity, direction, reason, comment, cost, user_id, created_at) ",
        scope.audit_table(),
        scope.owner_column()
    ));
    builder.push_values(commands, |mut row, command| {
        row.push_bind(scope.owner_id())
            .push_bind(command.batch_id)
            .push_bind(command.sku.clone())
            .push_bind(command.unit_id)
            .push_bind(command.quantity)
            .push_bind(command.direction.as_str())
            .push_bind(command.reason.clone())
            .push_bind(command.comment.clone())
            .push_bind(command.cost)
            .push_bind(command.actor.value())
            .push_bind(command.created_at);
    });

    let result = builder
        .build()
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    Ok(result.rows_affected())
}
