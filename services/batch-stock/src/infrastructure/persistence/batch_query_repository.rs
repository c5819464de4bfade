//! PostgreSQL 批次查询仓储

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use stockpile_adapter_postgres::map_sqlx_error;
use stockpile_common::Page;
use stockpile_errors::AppResult;

use crate::domain::{BatchPageQuery, BatchQueryRepository, BatchView, Scope};

pub struct PostgresBatchQueryRepository {
    pool: PgPool,
}

impl PostgresBatchQueryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// 外连接的列均可为空，缺失的翻译回退到基础名称
#[derive(sqlx::FromRow)]
struct BatchViewRow {
    id: i64,
    sku: String,
    product_name: Option<String>,
    quantity: Decimal,
    unit_id: i64,
    unit_name: Option<String>,
    expires_at: NaiveDate,
}

impl From<BatchViewRow> for BatchView {
    fn from(row: BatchViewRow) -> Self {
        Self {
            id: row.id,
            sku: row.sku,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_id: row.unit_id,
            unit_name: row.unit_name,
            expires_at: row.expires_at,
        }
    }
}

/// 带本地化名称的批次查询，调用方接着追加 WHERE 条件
fn select_views<'a>(scope: &Scope, locale: Option<String>) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(
        "SELECT b.id, b.sku, b.quantity, b.unit_id, b.expires_at, \
         COALESCE(pt.name, p.name) AS product_name, \
         COALESCE(ut.name, u.name) AS unit_name \
         FROM ",
    );
    builder
        .push(scope.batch_table())
        .push(
            " b \
             LEFT JOIN product_variants v ON v.sku = b.sku \
             LEFT JOIN products p ON p.id = v.product_id \
             LEFT JOIN units u ON u.id = b.unit_id \
             LEFT JOIN product_translations pt ON pt.product_id = p.id AND pt.locale = ",
        )
        .push_bind(locale.clone())
        .push(" LEFT JOIN unit_translations ut ON ut.unit_id = u.id AND ut.locale = ")
        .push_bind(locale)
        .push(" WHERE b.")
        .push(scope.owner_column())
        .push(" = ")
        .push_bind(scope.owner_id());
    builder
}

#[async_trait]
impl BatchQueryRepository for PostgresBatchQueryRepository {
    async fn paginate(&self, scope: &Scope, query: &BatchPageQuery) -> AppResult<Page<BatchView>> {
        let filter = &query.filter;
        let mut builder = select_views(scope, filter.locale.clone());

        if let Some(sku) = &filter.sku {
            builder.push(" AND b.sku = ").push_bind(sku.clone());
        }
        if let Some(before) = filter.expires_before {
            builder.push(" AND b.expires_at < ").push_bind(before);
        }
        if !filter.include_empty {
            builder.push(" AND b.quantity > 0");
        }

        let ascending = scope.lists_ascending();
        if let Some(key) = query.after {
            builder
                .push(" AND (b.expires_at, b.id) ")
                .push(query.page.direction.comparison(ascending))
                .push(" (")
                .push_bind(key.expires_at)
                .push(", ")
                .push_bind(key.id)
                .push(")");
        }

        let order = if query.page.direction.scan_ascending(ascending) {
            "ASC"
        } else {
            "DESC"
        };
        builder
            .push(format!(" ORDER BY b.expires_at {order}, b.id {order} LIMIT "))
            .push_bind(query.page.fetch_limit());

        let rows: Vec<BatchViewRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let views = rows.into_iter().map(BatchView::from).collect();
        Ok(Page::assemble(views, &query.page, |view: &BatchView| {
            view.order_key().to_cursor()
        }))
    }

    async fn get_by_id(
        &self,
        scope: &Scope,
        id: i64,
        locale: Option<&str>,
    ) -> AppResult<Option<BatchView>> {
        let mut builder = select_views(scope, locale.map(str::to_string));
        builder.push(" AND b.id = ").push_bind(id);

        let row: Option<BatchViewRow> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(BatchView::from))
    }
}
