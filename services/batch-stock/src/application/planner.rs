//! 批次更新规划
//!
//! 换算到标准单位后计算新数量，生成更新、新建与流水记录。
//! 输入与配方均按 SKU 排序遍历，流水顺序可复现。

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use rust_decimal::Decimal;
use stockpile_common::UserId;

use super::UnitConverter;
use crate::domain::{
    AuditCommand, BatchBase, BatchCreate, BatchMutation, BatchUpdate, BulkUpdateInfo,
    MutationKind, StockDirection, UnitOfWork, VariantMeta, reasons,
};
use crate::error::{BatchError, BatchResult};

/// 规划器
pub struct BatchPlanner<'a> {
    converter: &'a UnitConverter,
    actor: UserId,
    now: DateTime<Utc>,
}

/// 一条主请求换算后的结果数量，供配方展开使用
struct ResultAmount<'r> {
    sku: &'r str,
    quantity: Decimal,
}

#[derive(Default)]
struct PlanState {
    updates: BTreeMap<i64, BatchUpdate>,
    creates: BTreeMap<String, Vec<BatchCreate>>,
    audits: Vec<AuditCommand>,
}

impl PlanState {
    /// 本次计划中的最新数量，未变更时为持久化数量
    fn current(&self, batch: &BatchBase) -> Decimal {
        self.updates
            .get(&batch.id)
            .map(|u| u.new_quantity)
            .unwrap_or(batch.quantity)
    }

    fn record_update(
        &mut self,
        batch: &BatchBase,
        delta: Decimal,
        reason: &str,
    ) -> BatchResult<Decimal> {
        let new_quantity = self
            .current(batch)
            .checked_add(delta)
            .ok_or_else(|| BatchError::out_of_range(&format!("Quantity of batch {}", batch.id)))?;
        match self.updates.get_mut(&batch.id) {
            Some(update) => {
                update.modified_by = update
                    .modified_by
                    .checked_add(delta)
                    .ok_or_else(|| BatchError::out_of_range("Quantity change"))?;
                update.new_quantity = new_quantity;
                update.reason = reason.to_string();
            }
            None => {
                self.updates.insert(
                    batch.id,
                    BatchUpdate {
                        batch_id: batch.id,
                        sku: batch.sku.clone(),
                        new_quantity,
                        modified_by: delta,
                        reason: reason.to_string(),
                    },
                );
            }
        }
        Ok(new_quantity)
    }

    fn finish(self) -> UnitOfWork {
        let mut updates_by_sku: BTreeMap<String, Vec<BatchUpdate>> = BTreeMap::new();
        for update in self.updates.into_values() {
            updates_by_sku
                .entry(update.sku.clone())
                .or_default()
                .push(update);
        }
        UnitOfWork {
            updates_by_sku,
            creates_by_sku: self.creates,
            audit_commands: self.audits,
        }
    }
}

impl<'a> BatchPlanner<'a> {
    pub fn new(converter: &'a UnitConverter, actor: UserId, now: DateTime<Utc>) -> Self {
        Self {
            converter,
            actor,
            now,
        }
    }

    pub async fn plan(
        &self,
        kind: MutationKind,
        requests: &[BatchMutation],
        info: &BulkUpdateInfo,
    ) -> BatchResult<UnitOfWork> {
        let mut order: Vec<usize> = (0..requests.len()).collect();
        order.sort_by(|a, b| requests[*a].sku.cmp(&requests[*b].sku));

        let mut state = PlanState::default();
        let mut results = Vec::with_capacity(requests.len());

        for index in order {
            let request = &requests[index];
            let meta = variant(info, &request.sku)?;
            let (unit_id, quantity) = self
                .converter
                .convert(request.unit_id, meta.standard_unit_id, request.quantity)
                .await?;
            let reason = request
                .reason
                .clone()
                .unwrap_or_else(|| kind.default_reason().to_string());

            let (batch_id, direction) = if kind.is_increment() {
                let batch_id = match request.id {
                    Some(id) => {
                        let batch = existing_batch(info, id, &request.sku)?;
                        state.record_update(batch, quantity, &reason)?;
                        Some(id)
                    }
                    None => {
                        state
                            .creates
                            .entry(request.sku.clone())
                            .or_default()
                            .push(BatchCreate {
                                sku: request.sku.clone(),
                                quantity,
                                unit_id,
                                expires_at: self.expiry_for(meta)?,
                            });
                        None
                    }
                };
                results.push(ResultAmount {
                    sku: &request.sku,
                    quantity,
                });
                (batch_id, StockDirection::Inbound)
            } else {
                let id = request
                    .id
                    .ok_or_else(|| BatchError::invalid("Decrement requires a batch id"))?;
                let batch = existing_batch(info, id, &request.sku)?;
                let available = state.current(batch);
                if available < quantity {
                    return Err(BatchError::InsufficientQuantity {
                        id,
                        available,
                        requested: quantity,
                    });
                }
                state.record_update(batch, -quantity, &reason)?;
                (Some(id), StockDirection::Outbound)
            };

            state.audits.push(AuditCommand {
                batch_id,
                sku: request.sku.clone(),
                unit_id,
                quantity,
                direction,
                reason,
                comment: request.comment.clone(),
                cost: line_cost(meta.cost, quantity)?,
                actor: self.actor,
                created_at: self.now,
            });
        }

        if kind.includes_recipes() {
            for result in &results {
                self.expand_recipe(result, info, &mut state).await?;
            }
        }

        Ok(state.finish())
    }

    /// 按配方扣减原料，原料批次按先过期先出消耗
    async fn expand_recipe(
        &self,
        result: &ResultAmount<'_>,
        info: &BulkUpdateInfo,
        state: &mut PlanState,
    ) -> BatchResult<()> {
        for edge in info.recipes.edges_for(result.sku) {
            let ingredient = variant(info, &edge.ingredient_sku)?;
            let (unit_id, required) = self
                .converter
                .convert(
                    edge.unit_id,
                    ingredient.standard_unit_id,
                    edge.quantity
                        .checked_mul(result.quantity)
                        .ok_or_else(|| BatchError::out_of_range("Ingredient quantity"))?,
                )
                .await?;
            if required <= Decimal::ZERO {
                continue;
            }

            let batches = info
                .ingredient_batches
                .get(&edge.ingredient_sku)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let available = batches
                .iter()
                .try_fold(Decimal::ZERO, |sum, b| sum.checked_add(state.current(b)))
                .ok_or_else(|| BatchError::out_of_range("Ingredient stock"))?;
            if available < required {
                return Err(BatchError::InsufficientIngredient {
                    sku: edge.ingredient_sku.clone(),
                    available,
                    required,
                });
            }

            let mut remaining = required;
            for batch in batches {
                if remaining <= Decimal::ZERO {
                    break;
                }
                let current = state.current(batch);
                if current <= Decimal::ZERO {
                    continue;
                }
                let take = current.min(remaining);
                state.record_update(batch, -take, reasons::RECIPE_USE)?;
                state.audits.push(AuditCommand {
                    batch_id: Some(batch.id),
                    sku: edge.ingredient_sku.clone(),
                    unit_id,
                    quantity: take,
                    direction: StockDirection::Outbound,
                    reason: reasons::RECIPE_USE.to_string(),
                    comment: Some(format!("Used for {}", result.sku)),
                    cost: line_cost(ingredient.cost, take)?,
                    actor: self.actor,
                    created_at: self.now,
                });
                remaining -= take;
            }
        }
        Ok(())
    }

    fn expiry_for(&self, meta: &VariantMeta) -> BatchResult<NaiveDate> {
        let shelf_life = TimeDelta::try_days(i64::from(meta.shelf_life_days.max(0)))
            .ok_or_else(|| BatchError::Internal(format!("Shelf life of {} out of range", meta.sku)))?;
        self.now
            .date_naive()
            .checked_add_signed(shelf_life)
            .ok_or_else(|| BatchError::Internal(format!("Expiry of {} out of range", meta.sku)))
    }
}

fn line_cost(unit_cost: Decimal, quantity: Decimal) -> BatchResult<Decimal> {
    unit_cost
        .checked_mul(quantity)
        .ok_or_else(|| BatchError::out_of_range("Cost"))
}

fn variant<'i>(info: &'i BulkUpdateInfo, sku: &str) -> BatchResult<&'i VariantMeta> {
    info.variants
        .get(sku)
        .ok_or_else(|| BatchError::NotFound(format!("Product variant {}", sku)))
}

/// 批次必须存在且属于请求的 SKU
fn existing_batch<'i>(info: &'i BulkUpdateInfo, id: i64, sku: &str) -> BatchResult<&'i BatchBase> {
    info.batches
        .get(&id)
        .filter(|batch| batch.sku == sku)
        .ok_or(BatchError::BatchNotFound { id })
}
