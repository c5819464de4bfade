//! 批次库存服务
//!
//! 校验 → 解析配方 → 按序加锁 → 开启事务 → 事务内加载 → 规划 → 续期检查
//! → 写入 → 提交/回滚 → 逆序释放锁

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::counter;
use stockpile_common::{Page, UserId};
use stockpile_config::PaginationConfig;
use tracing::{info, instrument, warn};

use super::{BatchPlanner, LockManager, LockSet, UnitConverter, validate_mutations};
use crate::domain::{
    BatchMutation, BatchPageQuery, BatchQueryRepository, BatchView, BulkUpdateQuery,
    MutationKind, RecipeBook, RecipeRepository, Scope, StockTransactionFactory, UnitOfWork,
};
use crate::error::{BatchError, BatchResult};

/// 批次库存服务
pub struct BatchStockService {
    transactions: Arc<dyn StockTransactionFactory>,
    queries: Arc<dyn BatchQueryRepository>,
    recipes: Arc<dyn RecipeRepository>,
    converter: UnitConverter,
    locks: LockManager,
    refresh_margin: Duration,
    pagination: PaginationConfig,
}

impl BatchStockService {
    pub fn new(
        transactions: Arc<dyn StockTransactionFactory>,
        queries: Arc<dyn BatchQueryRepository>,
        recipes: Arc<dyn RecipeRepository>,
        converter: UnitConverter,
        locks: LockManager,
        refresh_margin: Duration,
        pagination: PaginationConfig,
    ) -> Self {
        Self {
            transactions,
            queries,
            recipes,
            converter,
            locks,
            refresh_margin,
            pagination,
        }
    }

    pub fn pagination(&self) -> &PaginationConfig {
        &self.pagination
    }

    pub fn converter(&self) -> &UnitConverter {
        &self.converter
    }

    #[instrument(skip(self, requests), fields(scope = %scope, count = requests.len()))]
    pub async fn increment(
        &self,
        scope: Scope,
        actor: UserId,
        requests: Vec<BatchMutation>,
    ) -> BatchResult<()> {
        self.execute(scope, actor, MutationKind::Increment, requests).await
    }

    #[instrument(skip(self, requests), fields(scope = %scope, count = requests.len()))]
    pub async fn decrement(
        &self,
        scope: Scope,
        actor: UserId,
        requests: Vec<BatchMutation>,
    ) -> BatchResult<()> {
        self.execute(scope, actor, MutationKind::Decrement, requests).await
    }

    #[instrument(skip(self, requests), fields(scope = %scope, count = requests.len()))]
    pub async fn increment_with_recipe(
        &self,
        scope: Scope,
        actor: UserId,
        requests: Vec<BatchMutation>,
    ) -> BatchResult<()> {
        self.execute(scope, actor, MutationKind::IncrementWithRecipe, requests)
            .await
    }

    #[instrument(skip(self, query), fields(scope = %scope))]
    pub async fn list(&self, scope: Scope, query: BatchPageQuery) -> BatchResult<Page<BatchView>> {
        Ok(self.queries.paginate(&scope, &query).await?)
    }

    /// 按 SKU 精确过滤的分页查询
    #[instrument(skip(self, query), fields(scope = %scope, sku = %sku))]
    pub async fn search(
        &self,
        scope: Scope,
        sku: String,
        mut query: BatchPageQuery,
    ) -> BatchResult<Page<BatchView>> {
        if sku.trim().is_empty() {
            return Err(BatchError::invalid("sku is required"));
        }
        query.filter.sku = Some(sku);
        Ok(self.queries.paginate(&scope, &query).await?)
    }

    #[instrument(skip(self), fields(scope = %scope))]
    pub async fn get_by_id(
        &self,
        scope: Scope,
        id: i64,
        locale: Option<String>,
    ) -> BatchResult<BatchView> {
        self.queries
            .get_by_id(&scope, id, locale.as_deref())
            .await?
            .ok_or(BatchError::BatchNotFound { id })
    }

    async fn execute(
        &self,
        scope: Scope,
        actor: UserId,
        kind: MutationKind,
        requests: Vec<BatchMutation>,
    ) -> BatchResult<()> {
        let started = Instant::now();
        let result = self.execute_inner(scope, actor, kind, &requests).await;

        let outcome = match &result {
            Ok(()) => "ok",
            Err(e) => e.code(),
        };
        counter!(
            "batch_stock_mutations_total",
            "operation" => kind.as_str(),
            "outcome" => outcome
        )
        .increment(1);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => info!(operation = kind.as_str(), elapsed_ms, "Batch mutation committed"),
            Err(e) => warn!(
                operation = kind.as_str(),
                code = e.code(),
                error = %e,
                elapsed_ms,
                "Batch mutation failed"
            ),
        }
        result
    }

    async fn execute_inner(
        &self,
        scope: Scope,
        actor: UserId,
        kind: MutationKind,
        requests: &[BatchMutation],
    ) -> BatchResult<()> {
        validate_mutations(&scope, kind, requests)?;

        let skus = sorted_unique(requests.iter().map(|r| r.sku.clone()));
        let recipes = if kind.includes_recipes() {
            self.resolve_recipes(&skus).await?
        } else {
            RecipeBook::default()
        };

        let query = BulkUpdateQuery {
            batch_ids: sorted_unique(requests.iter().filter_map(|r| r.id)),
            skus,
            ingredient_skus: recipes.ingredient_skus(),
        };

        let lock_names = query
            .batch_ids
            .iter()
            .map(|id| scope.batch_lock_name(*id))
            .chain(query.skus.iter().map(|sku| scope.sku_lock_name(sku)))
            .chain(query.ingredient_skus.iter().map(|sku| scope.sku_lock_name(sku)));
        let mut locks = self.locks.acquire_all(lock_names).await?;

        let result = self
            .run_transaction(&scope, actor, kind, requests, &query, recipes, &mut locks)
            .await;
        locks.release().await;
        result
    }

    async fn resolve_recipes(&self, result_skus: &[String]) -> BatchResult<RecipeBook> {
        let recipes = self.recipes.expand(result_skus).await?;
        if let Some(edge) = recipes.self_referencing() {
            return Err(BatchError::invalid(format!(
                "Recipe of {} consumes itself",
                edge.result_sku
            )));
        }
        Ok(recipes)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_transaction(
        &self,
        scope: &Scope,
        actor: UserId,
        kind: MutationKind,
        requests: &[BatchMutation],
        query: &BulkUpdateQuery,
        recipes: RecipeBook,
        locks: &mut LockSet,
    ) -> BatchResult<()> {
        let tx = self.transactions.begin().await?;

        let planned: BatchResult<UnitOfWork> = async {
            let info = tx
                .load_bulk_update_info(scope, query)
                .await?
                .with_recipes(recipes);
            let planner = BatchPlanner::new(&self.converter, actor, Utc::now());
            let plan = planner.plan(kind, requests, &info).await?;

            locks.refresh_if_needed(self.refresh_margin).await?;

            let report = tx.apply(scope, &plan).await?;
            let missing = report.missing_updates(&plan);
            if !missing.is_empty() {
                return Err(BatchError::BatchMissing { ids: missing });
            }
            Ok(plan)
        }
        .await;

        match planned {
            Ok(plan) => {
                tx.commit().await?;
                info!(
                    updates = plan.updates().count(),
                    creates = plan.creates().count(),
                    audits = plan.audit_commands.len(),
                    "Unit of work applied"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

fn sorted_unique<T: Ord>(items: impl Iterator<Item = T>) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort();
    items.dedup();
    items
}
