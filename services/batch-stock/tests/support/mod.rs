//! 集成测试共用的内存实现
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use batch_stock::application::{BatchStockService, LockManager, UnitConverter};
use batch_stock::domain::{
    ApplyReport, AuditCommand, BatchBase, BatchPageQuery, BatchQueryRepository, BatchView,
    BulkUpdateInfo, BulkUpdateQuery, RecipeBook, RecipeEdge, RecipeRepository, Scope,
    StockTransaction, StockTransactionFactory, Unit, UnitConversion, UnitOfWork,
    UnitRepository, VariantMeta,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use stockpile_common::Page;
use stockpile_config::{LockConfig, PaginationConfig};
use stockpile_errors::AppResult;
use stockpile_ports::DistributedLock;

pub const U_G: i64 = 1;
pub const U_KG: i64 = 2;
pub const U_PIECE: i64 = 3;

pub const WAREHOUSE: Scope = Scope::Warehouse(1);

pub fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn meta(sku: &str, standard_unit_id: i64, cost: &str, shelf_life_days: i32) -> VariantMeta {
    VariantMeta {
        sku: sku.to_string(),
        standard_unit_id,
        cost: dec(cost),
        shelf_life_days,
    }
}

// ---------------------------------------------------------------------------
// 分布式锁
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryLockStore {
    keys: Mutex<HashMap<String, String>>,
}

impl InMemoryLockStore {
    pub fn held_keys(&self) -> usize {
        self.keys.lock().unwrap().len()
    }
}

#[async_trait]
impl DistributedLock for InMemoryLockStore {
    async fn try_acquire(&self, key: &str, token: &str, _ttl: Duration) -> AppResult<bool> {
        let mut keys = self.keys.lock().unwrap();
        if keys.contains_key(key) {
            return Ok(false);
        }
        keys.insert(key.to_string(), token.to_string());
        Ok(true)
    }

    async fn release(&self, key: &str, token: &str) -> AppResult<bool> {
        let mut keys = self.keys.lock().unwrap();
        if keys.get(key).map(String::as_str) == Some(token) {
            keys.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn extend(&self, key: &str, token: &str, _ttl: Duration) -> AppResult<bool> {
        Ok(self.keys.lock().unwrap().get(key).map(String::as_str) == Some(token))
    }
}

// ---------------------------------------------------------------------------
// 批次存储
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredBatch {
    pub scope: Scope,
    pub batch: BatchBase,
}

#[derive(Default)]
struct StoreState {
    batches: BTreeMap<i64, StoredBatch>,
    audits: Vec<(Scope, AuditCommand)>,
    variants: HashMap<String, VariantMeta>,
    next_id: i64,
    /// 加载后、写入前被删除的批次
    vanished: Vec<i64>,
    commits: usize,
    rollbacks: usize,
}

/// 提交时才落盘的内存批次存储
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.state.lock().unwrap().next_id = 1_000;
        store
    }

    pub fn add_variant(&self, meta: VariantMeta) {
        self.state
            .lock()
            .unwrap()
            .variants
            .insert(meta.sku.clone(), meta);
    }

    pub fn add_batch(&self, scope: Scope, batch: BatchBase) {
        self.state
            .lock()
            .unwrap()
            .batches
            .insert(batch.id, StoredBatch { scope, batch });
    }

    /// 模拟批次在加载后被并发删除：写入时不再命中该行
    pub fn vanish_on_apply(&self, id: i64) {
        self.state.lock().unwrap().vanished.push(id);
    }

    pub fn batch(&self, id: i64) -> Option<BatchBase> {
        self.state
            .lock()
            .unwrap()
            .batches
            .get(&id)
            .map(|stored| stored.batch.clone())
    }

    pub fn batches_of(&self, sku: &str) -> Vec<BatchBase> {
        self.state
            .lock()
            .unwrap()
            .batches
            .values()
            .filter(|stored| stored.batch.sku == sku)
            .map(|stored| stored.batch.clone())
            .collect()
    }

    pub fn audits(&self) -> Vec<AuditCommand> {
        self.state
            .lock()
            .unwrap()
            .audits
            .iter()
            .map(|(_, audit)| audit.clone())
            .collect()
    }

    pub fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.state.lock().unwrap().rollbacks
    }
}

pub struct InMemoryTransaction {
    state: Arc<Mutex<StoreState>>,
    pending: Mutex<Vec<(Scope, UnitOfWork, Vec<i64>)>>,
}

#[async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn load_bulk_update_info(
        &self,
        scope: &Scope,
        query: &BulkUpdateQuery,
    ) -> AppResult<BulkUpdateInfo> {
        let state = self.state.lock().unwrap();
        let in_scope = |stored: &&StoredBatch| stored.scope == *scope;

        let batches = state
            .batches
            .values()
            .filter(in_scope)
            .filter(|stored| {
                query.batch_ids.contains(&stored.batch.id)
                    && query.skus.contains(&stored.batch.sku)
            })
            .map(|stored| (stored.batch.id, stored.batch.clone()))
            .collect();

        let variants = query
            .skus
            .iter()
            .filter_map(|sku| state.variants.get(sku))
            .map(|meta| (meta.sku.clone(), meta.clone()))
            .collect();

        let mut ingredient_batches: HashMap<String, Vec<BatchBase>> = HashMap::new();
        for stored in state.batches.values().filter(in_scope) {
            if query.ingredient_skus.contains(&stored.batch.sku) {
                ingredient_batches
                    .entry(stored.batch.sku.clone())
                    .or_default()
                    .push(stored.batch.clone());
            }
        }
        for batches in ingredient_batches.values_mut() {
            batches.sort_by_key(|b| (b.expires_at, b.id));
        }

        Ok(BulkUpdateInfo {
            batches,
            variants,
            recipes: RecipeBook::default(),
            ingredient_batches,
        })
    }

    async fn apply(&self, scope: &Scope, plan: &UnitOfWork) -> AppResult<ApplyReport> {
        let mut state = self.state.lock().unwrap();
        let updated_ids: Vec<i64> = plan
            .updates()
            .map(|u| u.batch_id)
            .filter(|id| {
                !state.vanished.contains(id)
                    && state
                        .batches
                        .get(id)
                        .is_some_and(|stored| stored.scope == *scope)
            })
            .collect();
        let mut created_ids = Vec::new();
        for _ in plan.creates() {
            state.next_id += 1;
            created_ids.push(state.next_id);
        }
        self.pending
            .lock()
            .unwrap()
            .push((*scope, plan.clone(), created_ids.clone()));
        Ok(ApplyReport {
            updated_ids,
            created_ids,
            audit_rows: plan.audit_commands.len() as u64,
        })
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        let mut state = self.state.lock().unwrap();
        for (scope, plan, created_ids) in pending {
            for update in plan.updates() {
                if let Some(stored) = state.batches.get_mut(&update.batch_id) {
                    stored.batch.quantity = update.new_quantity;
                }
            }
            for (create, id) in plan.creates().zip(created_ids) {
                state.batches.insert(
                    id,
                    StoredBatch {
                        scope,
                        batch: BatchBase {
                            id,
                            sku: create.sku.clone(),
                            quantity: create.quantity,
                            unit_id: create.unit_id,
                            expires_at: create.expires_at,
                        },
                    },
                );
            }
            for audit in &plan.audit_commands {
                state.audits.push((scope, audit.clone()));
            }
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        self.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}

#[async_trait]
impl StockTransactionFactory for InMemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StockTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            state: self.state.clone(),
            pending: Mutex::new(Vec::new()),
        }))
    }
}

#[async_trait]
impl BatchQueryRepository for InMemoryStore {
    async fn paginate(&self, scope: &Scope, query: &BatchPageQuery) -> AppResult<Page<BatchView>> {
        let ascending = scope.lists_ascending();
        let scan_ascending = query.page.direction.scan_ascending(ascending);
        let comparison = query.page.direction.comparison(ascending);

        let mut views: Vec<BatchView> = self
            .state
            .lock()
            .unwrap()
            .batches
            .values()
            .filter(|stored| stored.scope == *scope)
            .map(|stored| view_of(&stored.batch))
            .filter(|view| query.filter.matches(view))
            .filter(|view| match query.after {
                None => true,
                Some(after) => {
                    let key = view.order_key();
                    match comparison {
                        ">" => key > after,
                        ">=" => key >= after,
                        "<" => key < after,
                        _ => key <= after,
                    }
                }
            })
            .collect();

        views.sort_by_key(BatchView::order_key);
        if !scan_ascending {
            views.reverse();
        }
        views.truncate(query.page.fetch_limit() as usize);

        Ok(Page::assemble(views, &query.page, |view| {
            view.order_key().to_cursor()
        }))
    }

    async fn get_by_id(
        &self,
        scope: &Scope,
        id: i64,
        _locale: Option<&str>,
    ) -> AppResult<Option<BatchView>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .batches
            .get(&id)
            .filter(|stored| stored.scope == *scope)
            .map(|stored| view_of(&stored.batch)))
    }
}

fn view_of(batch: &BatchBase) -> BatchView {
    BatchView {
        id: batch.id,
        sku: batch.sku.clone(),
        product_name: None,
        quantity: batch.quantity,
        unit_id: batch.unit_id,
        unit_name: None,
        expires_at: batch.expires_at,
    }
}

// ---------------------------------------------------------------------------
// 单位与配方
// ---------------------------------------------------------------------------

/// g / kg / piece，kg → g 系数 1000
pub struct StaticUnits;

#[async_trait]
impl UnitRepository for StaticUnits {
    async fn list_units(&self) -> AppResult<Vec<Unit>> {
        Ok(vec![
            Unit {
                id: U_G,
                name: "g".into(),
            },
            Unit {
                id: U_KG,
                name: "kg".into(),
            },
            Unit {
                id: U_PIECE,
                name: "piece".into(),
            },
        ])
    }

    async fn list_conversions(&self) -> AppResult<Vec<UnitConversion>> {
        Ok(vec![UnitConversion {
            from_unit_id: U_KG,
            to_unit_id: U_G,
            factor: Decimal::from(1000),
        }])
    }

    async fn find_unit(&self, id: i64) -> AppResult<Option<Unit>> {
        Ok(self.list_units().await?.into_iter().find(|u| u.id == id))
    }

    async fn find_factor(&self, from_unit_id: i64, to_unit_id: i64) -> AppResult<Option<Decimal>> {
        Ok(self
            .list_conversions()
            .await?
            .into_iter()
            .find(|c| c.from_unit_id == from_unit_id && c.to_unit_id == to_unit_id)
            .map(|c| c.factor))
    }
}

#[derive(Default)]
pub struct InMemoryRecipes {
    pub edges: Vec<RecipeEdge>,
    pub ingredient_meta: HashMap<String, VariantMeta>,
}

impl InMemoryRecipes {
    pub fn with_edge(mut self, edge: RecipeEdge, ingredient: VariantMeta) -> Self {
        self.edges.push(edge);
        self.ingredient_meta.insert(ingredient.sku.clone(), ingredient);
        self
    }
}

#[async_trait]
impl RecipeRepository for InMemoryRecipes {
    async fn expand(&self, result_skus: &[String]) -> AppResult<RecipeBook> {
        let edges: Vec<RecipeEdge> = self
            .edges
            .iter()
            .filter(|edge| result_skus.contains(&edge.result_sku))
            .cloned()
            .collect();
        let ingredient_meta = edges
            .iter()
            .filter_map(|edge| self.ingredient_meta.get(&edge.ingredient_sku))
            .map(|meta| (meta.sku.clone(), meta.clone()))
            .collect();
        Ok(RecipeBook::from_edges(edges, ingredient_meta))
    }
}

// ---------------------------------------------------------------------------
// 组装
// ---------------------------------------------------------------------------

pub struct Harness {
    pub service: Arc<BatchStockService>,
    pub store: InMemoryStore,
    pub locks: Arc<InMemoryLockStore>,
}

pub async fn harness(store: InMemoryStore, recipes: InMemoryRecipes) -> Harness {
    let converter = UnitConverter::new(Arc::new(StaticUnits));
    converter.warm_up().await.unwrap();

    let locks = Arc::new(InMemoryLockStore::default());
    let lock_config = LockConfig {
        ttl_secs: 60,
        wait_timeout_ms: 2_000,
        retry_interval_ms: 5,
        refresh_margin_secs: 15,
    };
    let manager = LockManager::new(locks.clone(), &lock_config);

    let service = Arc::new(BatchStockService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(recipes),
        converter,
        manager,
        lock_config.refresh_margin(),
        PaginationConfig::default(),
    ));

    Harness {
        service,
        store,
        locks,
    }
}
