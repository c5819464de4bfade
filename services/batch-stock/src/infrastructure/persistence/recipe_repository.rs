//! PostgreSQL 配方解析

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use stockpile_adapter_postgres::map_sqlx_error;
use stockpile_errors::AppResult;

use crate::domain::{RecipeBook, RecipeEdge, RecipeRepository, VariantMeta};

pub struct PostgresRecipeRepository {
    pool: PgPool,
}

impl PostgresRecipeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// 没有配方的变体各列为空
#[derive(sqlx::FromRow)]
struct RecipeRow {
    result_sku: Option<String>,
    ingredient_sku: Option<String>,
    quantity: Option<Decimal>,
    unit_id: Option<i64>,
    ingredient_unit_id: Option<i64>,
    ingredient_cost: Option<Decimal>,
    ingredient_shelf_life_days: Option<i32>,
}

impl RecipeRow {
    fn edge(&self) -> Option<RecipeEdge> {
        Some(RecipeEdge {
            result_sku: self.result_sku.clone()?,
            ingredient_sku: self.ingredient_sku.clone()?,
            quantity: self.quantity?,
            unit_id: self.unit_id?,
        })
    }

    fn ingredient_meta(&self) -> Option<VariantMeta> {
        Some(VariantMeta {
            sku: self.ingredient_sku.clone()?,
            standard_unit_id: self.ingredient_unit_id?,
            cost: self.ingredient_cost?,
            shelf_life_days: self.ingredient_shelf_life_days?,
        })
    }
}

#[async_trait]
impl RecipeRepository for PostgresRecipeRepository {
    async fn expand(&self, result_skus: &[String]) -> AppResult<RecipeBook> {
        if result_skus.is_empty() {
            return Ok(RecipeBook::default());
        }

        let rows = sqlx::query_as::<_, RecipeRow>(
            r#"
            SELECT r.result_sku, r.ingredient_sku, r.quantity, r.unit_id,
                   iv.unit_id AS ingredient_unit_id,
                   iv.cost AS ingredient_cost,
                   iv.shelf_life_days AS ingredient_shelf_life_days
            FROM product_variants v
            LEFT JOIN recipes r ON r.result_sku = v.sku
            LEFT JOIN product_variants iv ON iv.sku = r.ingredient_sku
            WHERE v.sku = ANY($1)
            ORDER BY r.result_sku, r.ingredient_sku
            "#,
        )
        .bind(result_skus)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut edges = Vec::new();
        let mut ingredient_meta = HashMap::new();
        for row in &rows {
            if let Some(edge) = row.edge() {
                edges.push(edge);
            }
            if let Some(meta) = row.ingredient_meta() {
                ingredient_meta.insert(meta.sku.clone(), meta);
            }
        }

        Ok(RecipeBook::from_edges(edges, ingredient_meta))
    }
}
