//! 库存事务
//!
//! 一次批量变更的全部读写在同一数据库事务中完成

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use rust_decimal::Decimal;
use stockpile_errors::AppResult;

use super::{AuditCommand, BatchBase, BatchCreate, BatchUpdate, RecipeBook, Scope, VariantMeta};

/// 规划结果：数量更新、新建批次与流水
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOfWork {
    pub updates_by_sku: BTreeMap<String, Vec<BatchUpdate>>,
    pub creates_by_sku: BTreeMap<String, Vec<BatchCreate>>,
    pub audit_commands: Vec<AuditCommand>,
}

impl UnitOfWork {
    pub fn updates(&self) -> impl Iterator<Item = &BatchUpdate> {
        self.updates_by_sku.values().flatten()
    }

    pub fn creates(&self) -> impl Iterator<Item = &BatchCreate> {
        self.creates_by_sku.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.updates_by_sku.is_empty()
            && self.creates_by_sku.is_empty()
            && self.audit_commands.is_empty()
    }

    /// 批次数量的总变化量
    pub fn net_change(&self) -> Decimal {
        let updated: Decimal = self.updates().map(|u| u.modified_by).sum();
        let created: Decimal = self.creates().map(|c| c.quantity).sum();
        updated + created
    }
}

/// 事务内加载的键
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkUpdateQuery {
    pub batch_ids: Vec<i64>,
    /// 请求中出现的 SKU
    pub skus: Vec<String>,
    /// 配方原料 SKU，需要加载其全部批次
    pub ingredient_skus: Vec<String>,
}

/// 规划所需的当前状态
#[derive(Debug, Clone, Default)]
pub struct BulkUpdateInfo {
    pub batches: HashMap<i64, BatchBase>,
    pub variants: HashMap<String, VariantMeta>,
    pub recipes: RecipeBook,
    /// 原料批次（含空批次，本次调用可能先补货），按 `(expires_at, id)` 排序
    pub ingredient_batches: HashMap<String, Vec<BatchBase>>,
}

impl BulkUpdateInfo {
    /// 合并配方及原料元信息，原料元信息不覆盖已加载的变体
    pub fn with_recipes(mut self, recipes: RecipeBook) -> Self {
        for (sku, meta) in &recipes.ingredient_meta {
            self.variants
                .entry(sku.clone())
                .or_insert_with(|| meta.clone());
        }
        self.recipes = recipes;
        self
    }
}

/// 写入结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub updated_ids: Vec<i64>,
    pub created_ids: Vec<i64>,
    pub audit_rows: u64,
}

impl ApplyReport {
    /// 计划更新但未命中任何行的批次
    pub fn missing_updates(&self, plan: &UnitOfWork) -> Vec<i64> {
        let mut missing: Vec<i64> = plan
            .updates()
            .map(|u| u.batch_id)
            .filter(|id| !self.updated_ids.contains(id))
            .collect();
        missing.sort_unstable();
        missing.dedup();
        missing
    }
}

/// 库存事务
#[async_trait]
pub trait StockTransaction: Send + Sync {
    /// 加载并锁定批次行及变体元信息
    async fn load_bulk_update_info(
        &self,
        scope: &Scope,
        query: &BulkUpdateQuery,
    ) -> AppResult<BulkUpdateInfo>;

    /// 执行更新、新建与流水插入
    async fn apply(&self, scope: &Scope, plan: &UnitOfWork) -> AppResult<ApplyReport>;

    /// 提交事务
    async fn commit(self: Box<Self>) -> AppResult<()>;

    /// 回滚事务
    async fn rollback(self: Box<Self>) -> AppResult<()>;
}

/// 库存事务工厂
#[async_trait]
pub trait StockTransactionFactory: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn StockTransaction>>;
}
