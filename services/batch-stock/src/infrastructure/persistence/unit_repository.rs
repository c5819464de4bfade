//! PostgreSQL 计量单位仓储

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use stockpile_adapter_postgres::map_sqlx_error;
use stockpile_errors::AppResult;

use crate::domain::{Unit, UnitConversion, UnitRepository};

pub struct PostgresUnitRepository {
    pool: PgPool,
}

impl PostgresUnitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UnitRow {
    id: i64,
    name: String,
}

#[derive(sqlx::FromRow)]
struct ConversionRow {
    from_unit_id: i64,
    to_unit_id: i64,
    factor: Decimal,
}

impl From<UnitRow> for Unit {
    fn from(row: UnitRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
        }
    }
}

#[async_trait]
impl UnitRepository for PostgresUnitRepository {
    async fn list_units(&self) -> AppResult<Vec<Unit>> {
        let rows = sqlx::query_as::<_, UnitRow>("SELECT id, name FROM units ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Unit::from).collect())
    }

    async fn list_conversions(&self) -> AppResult<Vec<UnitConversion>> {
        let rows = sqlx::query_as::<_, ConversionRow>(
            "SELECT from_unit_id, to_unit_id, factor FROM unit_conversions",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| UnitConversion {
                from_unit_id: row.from_unit_id,
                to_unit_id: row.to_unit_id,
                factor: row.factor,
            })
            .collect())
    }

    async fn find_unit(&self, id: i64) -> AppResult<Option<Unit>> {
        let row = sqlx::query_as::<_, UnitRow>("SELECT id, name FROM units WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Unit::from))
    }

    async fn find_factor(&self, from_unit_id: i64, to_unit_id: i64) -> AppResult<Option<Decimal>> {
        sqlx::query_scalar::<_, Decimal>(
            "SELECT factor FROM unit_conversions WHERE from_unit_id = $1 AND to_unit_id = $2",
        )
        .bind(from_unit_id)
        .bind(to_unit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }
}
