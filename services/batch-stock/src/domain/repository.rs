//! 只读仓储接口

use async_trait::async_trait;
use rust_decimal::Decimal;
use stockpile_common::Page;
use stockpile_errors::AppResult;

use super::{BatchPageQuery, BatchView, RecipeBook, Scope, Unit, UnitConversion};

/// 批次查询
#[async_trait]
pub trait BatchQueryRepository: Send + Sync {
    /// 按 `(expires_at, id)` 游标分页
    async fn paginate(&self, scope: &Scope, query: &BatchPageQuery) -> AppResult<Page<BatchView>>;

    async fn get_by_id(
        &self,
        scope: &Scope,
        id: i64,
        locale: Option<&str>,
    ) -> AppResult<Option<BatchView>>;
}

/// 计量单位与换算系数
#[async_trait]
pub trait UnitRepository: Send + Sync {
    async fn list_units(&self) -> AppResult<Vec<Unit>>;

    async fn list_conversions(&self) -> AppResult<Vec<UnitConversion>>;

    async fn find_unit(&self, id: i64) -> AppResult<Option<Unit>>;

    async fn find_factor(&self, from_unit_id: i64, to_unit_id: i64) -> AppResult<Option<Decimal>>;
}

/// 配方解析
#[async_trait]
pub trait RecipeRepository: Send + Sync {
    /// 展开结果 SKU 的配方，不递归
    async fn expand(&self, result_skus: &[String]) -> AppResult<RecipeBook>;
}
